//! Pure chain transition function
//!
//! Given a chain and an event, decide the next chain and the effects to
//! run. No I/O happens here; the flow layer executes the effects.

use super::state::highest_selected;
use super::{ChainError, ChainEvent, Effect, SelectionChain, Step};
use thiserror::Error;

/// Fixed context shared by every transition
#[derive(Debug, Clone)]
pub struct ChainContext {
    /// Public site the finalize link points to, without a trailing slash
    pub site_url: String,
}

impl ChainContext {
    pub fn new(site_url: impl Into<String>) -> Self {
        let site_url: String = site_url.into();
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Result of a chain transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_chain: SelectionChain,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(chain: SelectionChain) -> Self {
        Self {
            new_chain: chain,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("chain {0} is finalized")]
    Finalized(i64),
    #[error("payload carries no selection")]
    NoSelection,
    #[error("invalid selection: {0}")]
    InvalidSelection(#[from] ChainError),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Pure transition function
pub fn transition(
    chain: &SelectionChain,
    context: &ChainContext,
    event: ChainEvent,
) -> Result<TransitionResult, TransitionError> {
    if chain.is_finalized() {
        return Err(TransitionError::Finalized(chain.id()));
    }

    match event {
        ChainEvent::Start => Ok(TransitionResult::new(chain.clone())
            .with_effect(Effect::PersistChain)
            .with_effect(Effect::SendPrompt)),

        ChainEvent::Selection { selections } => {
            let step = highest_selected(&selections).ok_or(TransitionError::NoSelection)?;
            let mut next = chain.clone();
            next.select(step, &selections)?;

            if step.is_terminal() {
                let url = deep_link(&context.site_url, &next)?;
                let tokens = next.finalize();
                Ok(TransitionResult::new(next)
                    .with_effect(Effect::PersistChain)
                    .with_effect(Effect::SendDeepLink { url })
                    .with_effect(Effect::ReleaseTokens { tokens }))
            } else {
                Ok(TransitionResult::new(next)
                    .with_effect(Effect::PersistChain)
                    .with_effect(Effect::SendPrompt))
            }
        }

        // Silent: no message goes out on expiry
        ChainEvent::Expire => {
            let mut next = chain.clone();
            let tokens = next.finalize();
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PersistChain)
                .with_effect(Effect::ReleaseTokens { tokens }))
        }
    }
}

/// Build the map link for a completed chain.
///
/// Every id from brand to maintenance must be present; anything else is a
/// bug upstream, not a user error.
pub fn deep_link(site_url: &str, chain: &SelectionChain) -> Result<String, TransitionError> {
    let id = |step: Step| {
        chain.selection(step).ok_or_else(|| {
            TransitionError::InvariantViolation(format!(
                "chain {} has no {step} for the finalize link",
                chain.id()
            ))
        })
    };

    Ok(format!(
        "{site_url}/to/map/?b={}&m={}&g={}&s={}&mt={}",
        id(Step::Brand)?,
        id(Step::Model)?,
        id(Step::Generation)?,
        id(Step::Specification)?,
        id(Step::Maintenance)?,
    ))
}
