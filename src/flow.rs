//! Booking flow
//!
//! Interprets webhook commands against selection chains, builds the next
//! set of buttons and finalizes chains on the last step or on expiry.

mod buttons;
mod dispatcher;
mod error;
mod processor;
mod sweeper;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use buttons::{maintenance_label, ButtonOption, ButtonOptionBuilder};
pub use dispatcher::{prompt_text, MessageDispatcher, PreparedOptions, MAX_BACK_STEPS};
pub use error::FlowError;
pub use processor::{EventOutcome, FlowProcessor, InboundCommand};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use traits::*;

use chrono::Duration;
use std::sync::Arc;

/// Injected capabilities shared by every flow component
#[derive(Clone)]
pub struct FlowServices {
    pub store: Arc<dyn ChainStore>,
    pub cache: Arc<dyn TokenCache>,
    pub catalog: Arc<dyn Catalog>,
    pub transport: Arc<dyn Transport>,
}

impl FlowServices {
    /// SQLite-backed store, cache and catalog with the given transport
    pub fn with_database(storage: DatabaseStorage, transport: Arc<dyn Transport>) -> Self {
        let storage = Arc::new(storage);
        Self {
            store: storage.clone(),
            cache: storage.clone(),
            catalog: storage,
            transport,
        }
    }
}

/// Tunables for the flow
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Public site the finalize link points to
    pub site_url: String,
    /// Open chains older than this are finalized by the sweeper
    pub chain_lifetime: Duration,
    /// How long a minted button token stays resolvable
    pub token_ttl: Duration,
}

/// Remove every token in `tokens` from the cache
pub(crate) async fn release_tokens(
    cache: &dyn TokenCache,
    chain_id: i64,
    tokens: &[String],
) -> Result<(), FlowError> {
    for token in tokens {
        cache.remove(token).await?;
    }
    tracing::debug!(chain_id, count = tokens.len(), "Released tokens");
    Ok(())
}
