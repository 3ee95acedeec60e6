//! Flow error taxonomy

use crate::chain::TransitionError;
use crate::db::DbError;
use crate::textback::TransportError;
use thiserror::Error;

/// Everything that can abandon an event or a sweep step
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed or incomplete envelope or payload
    #[error("validation failed: {0}")]
    Validation(String),
    /// Chain, cache entry or catalog id absent
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    /// Optimistic version check lost a race
    #[error("chain {chain_id} was modified concurrently")]
    Conflict { chain_id: i64 },
    #[error("storage failed: {0}")]
    Storage(String),
    /// Data-integrity bug, never a user error
    #[error("INVARIANT VIOLATION: {0}")]
    InvariantViolation(String),
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Transport(_) => "transport",
            Self::Conflict { .. } => "conflict",
            Self::Storage(_) => "storage",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }

    /// Errors pointing at a bug or a broken dependency rather than a bad
    /// or racing event
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::InvariantViolation(_))
    }
}

impl From<DbError> for FlowError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ChainNotFound(id) => Self::NotFound(format!("chain {id}")),
            DbError::VersionConflict { id, .. } => Self::Conflict { chain_id: id },
            DbError::Corrupt(message) => Self::InvariantViolation(message),
            DbError::Sqlite(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<TransitionError> for FlowError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvariantViolation(message) => Self::InvariantViolation(message),
            other => Self::Validation(other.to_string()),
        }
    }
}
