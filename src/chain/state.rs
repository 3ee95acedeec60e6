//! Selection chain record

use super::Step;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Resolved catalog ids, indexed by `Step::index()`
pub type Selections = [Option<i64>; Step::COUNT];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{step} is set but an earlier step is empty")]
    PrefixGap { step: Step },
    #[error("chain is finalized")]
    Finalized,
}

/// Address of the chat a chain belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub channel: String,
    pub channel_id: i64,
    pub chat_id: String,
}

impl ChatRef {
    pub fn new(channel: impl Into<String>, channel_id: i64, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            channel_id,
            chat_id: chat_id.into(),
        }
    }
}

/// Per-conversation booking state.
///
/// Selections always form a strict prefix: step `i` is set only if every
/// step before it is set. `finalized` never goes back to false, and the
/// owned token set only grows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionChain {
    id: i64,
    chat: ChatRef,
    selections: Selections,
    finalized: bool,
    owned_tokens: BTreeSet<String>,
    created_at: DateTime<Utc>,
    version: i64,
}

impl SelectionChain {
    /// A freshly created, empty chain
    pub fn new(id: i64, chat: ChatRef, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            chat,
            selections: [None; Step::COUNT],
            finalized: false,
            owned_tokens: BTreeSet::new(),
            created_at,
            version: 0,
        }
    }

    /// Rebuild a chain from storage, rejecting records that break the
    /// prefix invariant.
    pub fn restore(
        id: i64,
        chat: ChatRef,
        selections: Selections,
        finalized: bool,
        owned_tokens: BTreeSet<String>,
        created_at: DateTime<Utc>,
        version: i64,
    ) -> Result<Self, ChainError> {
        check_prefix(&selections)?;
        Ok(Self {
            id,
            chat,
            selections,
            finalized,
            owned_tokens,
            created_at,
            version,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn chat(&self) -> &ChatRef {
        &self.chat
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn selection(&self, step: Step) -> Option<i64> {
        self.selections[step.index()]
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn owned_tokens(&self) -> &BTreeSet<String> {
        &self.owned_tokens
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Called by storage after a successful compare-and-swap
    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    /// The step the user has to answer next, or `None` once all six are set
    pub fn first_unresolved(&self) -> Option<Step> {
        Step::ALL
            .into_iter()
            .find(|step| self.selections[step.index()].is_none())
    }

    /// Apply a selection at `step`.
    ///
    /// `selections` is the full delta carried by the button: every step up
    /// to and including `step` is copied onto the chain and everything after
    /// it is cleared.
    pub fn select(&mut self, step: Step, selections: &Selections) -> Result<(), ChainError> {
        if self.finalized {
            return Err(ChainError::Finalized);
        }
        let upto = step.index() + 1;
        check_prefix(&selections[..upto])?;
        if selections[step.index()].is_none() {
            return Err(ChainError::PrefixGap { step });
        }
        self.selections[..upto].copy_from_slice(&selections[..upto]);
        self.clear_from(step.next());
        Ok(())
    }

    /// Clear `step` and every step after it
    pub fn clear_from(&mut self, step: Option<Step>) {
        if let Some(step) = step {
            for slot in &mut self.selections[step.index()..] {
                *slot = None;
            }
        }
    }

    /// Step back from a dead end at `step` by clearing its parent.
    ///
    /// Returns the step that now needs an answer, or `None` when `step` is
    /// the first one and there is nothing to retreat to.
    pub fn retreat_from(&mut self, step: Step) -> Option<Step> {
        let parent = step.parent()?;
        self.clear_from(Some(parent));
        Some(parent)
    }

    /// Record a token minted for this chain. Returns false if it was
    /// already owned.
    pub fn own_token(&mut self, token: impl Into<String>) -> bool {
        self.owned_tokens.insert(token.into())
    }

    /// Close the chain for good and hand back the tokens to release
    pub fn finalize(&mut self) -> Vec<String> {
        self.finalized = true;
        self.owned_tokens.iter().cloned().collect()
    }

    pub fn is_expired(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        now >= self.created_at + lifetime
    }
}

/// The highest step carrying an id, scanning maintenance first
pub fn highest_selected(selections: &Selections) -> Option<Step> {
    Step::precedence().find(|step| selections[step.index()].is_some())
}

fn check_prefix(selections: &[Option<i64>]) -> Result<(), ChainError> {
    let mut gap = false;
    for (index, slot) in selections.iter().enumerate() {
        match slot {
            None => gap = true,
            Some(_) if gap => {
                let step = Step::from_index(index).unwrap_or(Step::Maintenance);
                return Err(ChainError::PrefixGap { step });
            }
            Some(_) => {}
        }
    }
    Ok(())
}
