//! Webhook command processor
//!
//! Resolves the button token, loads or creates the chain, applies at most
//! one step through the pure transition function and runs the resulting
//! effects.

use super::{
    release_tokens, ButtonOptionBuilder, Catalog, ChainStore, FlowError, FlowServices,
    FlowSettings, MessageDispatcher, TokenCache,
};
use crate::cache::{CachedPayload, PAYLOAD_TYPE_APPOINTMENT};
use crate::chain::{
    highest_selected, transition, ChainContext, ChainEvent, ChatRef, Effect, Step, TransitionResult,
};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Decoded webhook command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub chat: ChatRef,
    /// Token of the pressed button; `None` for a fresh conversation
    pub token: Option<String>,
}

/// What happened to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// New chain created and the city prompt dispatched
    Started { chain_id: i64 },
    /// One step applied and the next prompt dispatched
    Advanced { chain_id: i64, step: Step },
    /// Maintenance applied, link sent, chain closed
    Finalized { chain_id: i64 },
    /// Event had no effect
    Ignored { chain_id: i64, reason: &'static str },
}

pub struct FlowProcessor {
    store: Arc<dyn ChainStore>,
    cache: Arc<dyn TokenCache>,
    catalog: Arc<dyn Catalog>,
    dispatcher: MessageDispatcher,
    context: ChainContext,
}

impl FlowProcessor {
    pub fn new(services: FlowServices, settings: &FlowSettings) -> Self {
        let builder = ButtonOptionBuilder::new(
            services.cache.clone(),
            services.catalog.clone(),
            settings.token_ttl,
        );
        let dispatcher =
            MessageDispatcher::new(services.store.clone(), builder, services.transport);
        Self {
            store: services.store,
            cache: services.cache,
            catalog: services.catalog,
            dispatcher,
            context: ChainContext::new(settings.site_url.clone()),
        }
    }

    /// Handle one webhook command under `event_id`. Never fails: every
    /// error is logged and the event is abandoned.
    pub async fn process(&self, event_id: Uuid, command: InboundCommand) {
        let span = tracing::info_span!(
            "webhook_event",
            %event_id,
            channel = %command.chat.channel,
            channel_id = command.chat.channel_id,
            chat_id = %command.chat.chat_id,
        );

        async {
            match self.handle(command).await {
                Ok(outcome) => tracing::info!(?outcome, "Event processed"),
                Err(e @ FlowError::InvariantViolation(_)) => {
                    tracing::error!(error = %e, kind = e.kind(), "Invariant violated, event abandoned");
                }
                Err(e) if e.is_severe() => {
                    tracing::error!(error = %e, kind = e.kind(), "Event failed");
                }
                Err(e) => tracing::warn!(error = %e, kind = e.kind(), "Event abandoned"),
            }
        }
        .instrument(span)
        .await;
    }

    /// Handle one webhook command, reporting what happened
    pub async fn handle(&self, command: InboundCommand) -> Result<EventOutcome, FlowError> {
        let payload = self.resolve_token(command.token.as_deref()).await?;

        let Some(chain_id) = payload.as_ref().and_then(|p| p.appointment_id) else {
            return self.start(&command.chat).await;
        };

        let chain = self.store.get_chain(chain_id).await?;
        if chain.is_finalized() {
            tracing::debug!(chain_id, "Chain already finalized, ignoring event");
            return Ok(EventOutcome::Ignored {
                chain_id,
                reason: "finalized",
            });
        }
        if chain.chat() != &command.chat {
            return Err(FlowError::validation(format!(
                "chain {chain_id} belongs to another chat"
            )));
        }

        let selections = payload.map(|p| p.selections()).unwrap_or_default();
        let Some((step, candidate_id)) = highest_selected(&selections)
            .and_then(|step| selections[step.index()].map(|id| (step, id)))
        else {
            return Ok(EventOutcome::Ignored {
                chain_id,
                reason: "no selection",
            });
        };

        if !self.catalog.exists(step, candidate_id).await? {
            return Err(FlowError::not_found(format!("{step} {candidate_id}")));
        }

        let result = transition(&chain, &self.context, ChainEvent::Selection { selections })?;
        let finalized = result.new_chain.is_finalized();
        self.execute(result).await?;

        Ok(if finalized {
            EventOutcome::Finalized { chain_id }
        } else {
            EventOutcome::Advanced { chain_id, step }
        })
    }

    async fn resolve_token(&self, token: Option<&str>) -> Result<Option<CachedPayload>, FlowError> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let payload = self
            .cache
            .get(token)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("token {token}")))?;

        if payload.kind != PAYLOAD_TYPE_APPOINTMENT {
            return Err(FlowError::validation(format!(
                "unsupported payload type {}",
                payload.kind
            )));
        }
        Ok(Some(payload))
    }

    async fn start(&self, chat: &ChatRef) -> Result<EventOutcome, FlowError> {
        let chain = self.store.create_chain(chat).await?;
        let chain_id = chain.id();
        tracing::info!(chain_id, "Created chain");

        let result = transition(&chain, &self.context, ChainEvent::Start)?;
        self.execute(result).await?;
        Ok(EventOutcome::Started { chain_id })
    }

    /// Run effects in order. A failed send does not stop the effects
    /// after it.
    async fn execute(&self, result: TransitionResult) -> Result<(), FlowError> {
        let mut chain = result.new_chain;

        for effect in result.effects {
            let outcome = match effect {
                Effect::PersistChain => self.store.save_chain(&mut chain).await,
                Effect::SendPrompt => self.dispatcher.send_message(&mut chain).await,
                Effect::SendDeepLink { url } => self
                    .dispatcher
                    .send_deep_link(&chain, &url)
                    .await
                    .map(|_| ()),
                Effect::ReleaseTokens { tokens } => {
                    release_tokens(self.cache.as_ref(), chain.id(), &tokens).await
                }
            };

            match outcome {
                Ok(()) => {}
                Err(FlowError::Transport(e)) => {
                    tracing::warn!(chain_id = chain.id(), error = %e, "Send failed, continuing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
