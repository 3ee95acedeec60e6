//! Effects produced by chain transitions

/// Effects to be executed after a transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Persist the new chain (optimistic version check)
    PersistChain,

    /// Prompt the user for the next unresolved step
    SendPrompt,

    /// Send the finalize link
    SendDeepLink { url: String },

    /// Drop these tokens from the token cache
    ReleaseTokens { tokens: Vec<String> },
}
