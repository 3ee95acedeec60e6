//! Events that can occur on a chain

use super::Selections;

/// Events that trigger chain transitions
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A chain was just created for a chat
    Start,

    /// A button was tapped; carries the ids resolved from its token
    Selection { selections: Selections },

    /// The chain outlived its lifetime
    Expire,
}
