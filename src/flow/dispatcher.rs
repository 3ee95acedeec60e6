//! Message dispatcher
//!
//! Picks the prompt for a chain's next step, gathers its buttons and sends
//! them. When a step has no candidates the dispatcher steps back to the
//! parent and tries again, at most `MAX_BACK_STEPS` times.

use super::{ButtonOption, ButtonOptionBuilder, ChainStore, FlowError, Transport};
use crate::chain::{SelectionChain, Step};
use crate::textback::{Delivery, OutboundMessage};
use std::sync::Arc;

/// Retreats needed to get from the maintenance step back to the city step
pub const MAX_BACK_STEPS: usize = Step::COUNT - 1;

/// Result of the option/back-step loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedOptions {
    Ready {
        step: Step,
        options: Vec<ButtonOption>,
    },
    /// Not even the city step has candidates
    Exhausted,
}

/// Prompt shown above the buttons for a step
pub fn prompt_text(step: Step) -> &'static str {
    match step {
        Step::City => "Здравствуйте! Чтобы записаться на ТО, выберите ваш город:",
        Step::Brand => "Выберите марку автомобиля:",
        Step::Model => "Выберите модель:",
        Step::Generation => "Выберите поколение:",
        Step::Specification => "Выберите модификацию:",
        Step::Maintenance => "Выберите ТО:",
    }
}

#[derive(Clone)]
pub struct MessageDispatcher {
    store: Arc<dyn ChainStore>,
    builder: ButtonOptionBuilder,
    transport: Arc<dyn Transport>,
}

impl MessageDispatcher {
    pub fn new(
        store: Arc<dyn ChainStore>,
        builder: ButtonOptionBuilder,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            builder,
            transport,
        }
    }

    /// Build options for the next step, stepping back over dead ends.
    ///
    /// Leaves the chain modified (cleared parents, new owned tokens) but
    /// does not persist it.
    pub async fn prepare_options(
        &self,
        chain: &mut SelectionChain,
    ) -> Result<PreparedOptions, FlowError> {
        for _ in 0..=MAX_BACK_STEPS {
            let Some(step) = chain.first_unresolved() else {
                return Err(FlowError::InvariantViolation(format!(
                    "chain {} is open with every step resolved",
                    chain.id()
                )));
            };

            let options = self.builder.build(chain).await?;
            if !options.is_empty() {
                return Ok(PreparedOptions::Ready { step, options });
            }

            let Some(parent) = chain.retreat_from(step) else {
                break;
            };
            tracing::info!(chain_id = chain.id(), from = %step, to = %parent, "No options, stepping back");
        }
        Ok(PreparedOptions::Exhausted)
    }

    /// Send the prompt for the chain's next step.
    ///
    /// The chain is persisted before the send, so a transport failure
    /// leaves it ready for the next interaction.
    pub async fn send_message(&self, chain: &mut SelectionChain) -> Result<(), FlowError> {
        let prepared = self.prepare_options(chain).await?;
        self.store.save_chain(chain).await?;

        match prepared {
            PreparedOptions::Ready { step, options } => {
                let buttons = options.into_iter().map(ButtonOption::into_button).collect();
                let message = OutboundMessage::text(chain.chat(), prompt_text(step)).with_buttons(buttons);
                self.deliver(chain.id(), &message).await?;
                Ok(())
            }
            PreparedOptions::Exhausted => {
                tracing::error!(chain_id = chain.id(), "Catalog has no active cities, nothing sent");
                Ok(())
            }
        }
    }

    /// Plain-text send of the finalize link
    pub async fn send_deep_link(
        &self,
        chain: &SelectionChain,
        url: &str,
    ) -> Result<Delivery, FlowError> {
        let message = OutboundMessage::text(chain.chat(), url);
        self.deliver(chain.id(), &message).await
    }

    async fn deliver(&self, chain_id: i64, message: &OutboundMessage) -> Result<Delivery, FlowError> {
        match self.transport.send(message).await {
            Ok(delivery) => {
                tracing::info!(
                    chain_id,
                    status = delivery.status_code,
                    content = %delivery.content,
                    "Message delivered"
                );
                Ok(delivery)
            }
            Err(e) => {
                let request = serde_json::to_string(message).unwrap_or_default();
                tracing::error!(chain_id, error = %e, kind = ?e.kind, %request, "Failed to send message");
                Err(FlowError::Transport(e))
            }
        }
    }
}
