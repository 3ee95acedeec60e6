//! Expiry sweeper
//!
//! Finalizes open chains older than the configured lifetime and releases
//! their tokens. No message is sent for an expired chain.

use super::{release_tokens, ChainStore, FlowError, FlowServices, FlowSettings, TokenCache};
use crate::chain::{transition, ChainContext, ChainEvent, Effect, SelectionChain};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Open chains examined
    pub scanned: usize,
    /// Chains closed by this sweep
    pub finalized: usize,
    /// Chains skipped because a live event wrote them first
    pub conflicts: usize,
    /// Chains that could not be loaded or expired
    pub failed: usize,
    /// Expired cache entries reclaimed
    pub purged_tokens: usize,
}

pub struct ExpirySweeper {
    store: Arc<dyn ChainStore>,
    cache: Arc<dyn TokenCache>,
    lifetime: Duration,
    context: ChainContext,
}

impl ExpirySweeper {
    pub fn new(services: FlowServices, settings: &FlowSettings) -> Self {
        Self {
            store: services.store,
            cache: services.cache,
            lifetime: settings.chain_lifetime,
            context: ChainContext::new(settings.site_url.clone()),
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, FlowError> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the clock read `now`.
    ///
    /// A chain that fails to load or expire is logged and counted in
    /// `failed`; the rest of the pass continues.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, FlowError> {
        let chains = self.store.list_open_chains().await?;
        let mut report = SweepReport {
            scanned: chains.len(),
            ..SweepReport::default()
        };

        for chain in chains {
            let chain = match chain {
                Ok(chain) => chain,
                Err(e) => {
                    tracing::error!(error = %e, kind = e.kind(), "Skipping unreadable chain");
                    report.failed += 1;
                    continue;
                }
            };
            if !chain.is_expired(self.lifetime, now) {
                continue;
            }

            match self.expire(&chain).await {
                Ok(()) => {
                    tracing::info!(chain_id = chain.id(), created_at = %chain.created_at(), "Chain expired");
                    report.finalized += 1;
                }
                Err(FlowError::Conflict { chain_id }) => {
                    tracing::info!(chain_id, "Chain changed during sweep, skipping");
                    report.conflicts += 1;
                }
                Err(e) => {
                    tracing::error!(chain_id = chain.id(), error = %e, kind = e.kind(), "Failed to expire chain");
                    report.failed += 1;
                }
            }
        }

        report.purged_tokens = self.cache.purge_expired().await?;
        Ok(report)
    }

    /// Finalize one chain and release its tokens, persisting first
    async fn expire(&self, chain: &SelectionChain) -> Result<(), FlowError> {
        let result = transition(chain, &self.context, ChainEvent::Expire)?;
        let mut expired = result.new_chain;

        for effect in result.effects {
            match effect {
                Effect::PersistChain => self.store.save_chain(&mut expired).await?,
                Effect::ReleaseTokens { tokens } => {
                    release_tokens(self.cache.as_ref(), expired.id(), &tokens).await?;
                }
                other => {
                    return Err(FlowError::InvariantViolation(format!(
                        "expiry of chain {} produced {other:?}",
                        expired.id()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Run `sweep` every `period` until cancelled
    pub fn spawn_periodic(
        self: Arc<Self>,
        period: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(report) => tracing::info!(?report, "Sweep finished"),
                            Err(e) => tracing::error!(error = %e, kind = e.kind(), "Sweep failed"),
                        }
                    }
                }
            }
            tracing::info!("Sweeper stopped");
        })
    }
}
