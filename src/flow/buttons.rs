//! Button option builder
//!
//! Computes the candidates for a chain's first unresolved step, mints a
//! cache token for each one and records the token on the chain.

use super::{Catalog, FlowError, TokenCache};
use crate::cache::CachedPayload;
use crate::chain::{SelectionChain, Selections, Step};
use crate::db::Maintenance;
use crate::textback::Button;
use chrono::Duration;
use std::cmp::Reverse;
use std::sync::Arc;

/// One button: what the user sees and the token it sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonOption {
    pub label: String,
    pub token: String,
}

impl ButtonOption {
    pub fn into_button(self) -> Button {
        Button::action(self.label, self.token)
    }
}

#[derive(Clone)]
pub struct ButtonOptionBuilder {
    cache: Arc<dyn TokenCache>,
    catalog: Arc<dyn Catalog>,
    token_ttl: Duration,
}

impl ButtonOptionBuilder {
    pub fn new(cache: Arc<dyn TokenCache>, catalog: Arc<dyn Catalog>, token_ttl: Duration) -> Self {
        Self {
            cache,
            catalog,
            token_ttl,
        }
    }

    /// Options for the chain's first unresolved step, in display order.
    ///
    /// Empty when every step is resolved or the catalog has nothing for
    /// the step. Minted tokens are added to the chain's owned set; the
    /// caller persists the chain.
    pub async fn build(&self, chain: &mut SelectionChain) -> Result<Vec<ButtonOption>, FlowError> {
        let Some(step) = chain.first_unresolved() else {
            return Ok(Vec::new());
        };

        let candidates = self.candidates(step, chain.selections()).await?;
        let mut options = Vec::with_capacity(candidates.len());

        for (candidate_id, label) in candidates {
            let payload =
                CachedPayload::for_candidate(chain.id(), chain.selections(), step, candidate_id);
            let token = payload.token();
            self.cache.put(&token, &payload, self.token_ttl).await?;
            chain.own_token(token.clone());
            options.push(ButtonOption { label, token });
        }

        tracing::debug!(chain_id = chain.id(), %step, count = options.len(), "Built options");
        Ok(options)
    }

    /// Active candidates for `step` as (id, label), scoped by the parent
    async fn candidates(
        &self,
        step: Step,
        selections: &Selections,
    ) -> Result<Vec<(i64, String)>, FlowError> {
        let candidates: Vec<(i64, String)> = match step {
            Step::City => self
                .catalog
                .cities()
                .await?
                .into_iter()
                .filter(|c| c.active)
                .map(|c| (c.id, c.name))
                .collect(),

            Step::Brand => self
                .catalog
                .brands_in_city(parent_id(step, selections)?)
                .await?
                .into_iter()
                .filter(|b| b.active)
                .map(|b| (b.id, b.name))
                .collect(),

            Step::Model => {
                let mut models: Vec<_> = self
                    .catalog
                    .models_of_brand(parent_id(step, selections)?)
                    .await?
                    .into_iter()
                    .filter(|m| m.active && m.external_id.is_some())
                    .collect();
                models.sort_by(|a, b| a.name.cmp(&b.name));
                models.into_iter().map(|m| (m.id, m.name)).collect()
            }

            Step::Generation => {
                let mut generations: Vec<_> = self
                    .catalog
                    .generations_of_model(parent_id(step, selections)?)
                    .await?
                    .into_iter()
                    .filter(|g| g.active)
                    .collect();
                generations.sort_by_key(|g| Reverse(g.year_of_issue));
                generations.into_iter().map(|g| (g.id, g.label)).collect()
            }

            Step::Specification => {
                let mut specifications: Vec<_> = self
                    .catalog
                    .specifications_of_generation(parent_id(step, selections)?)
                    .await?
                    .into_iter()
                    .filter(|s| s.active)
                    .collect();
                specifications.sort_by_key(|s| (s.engine_capacity, s.engine_power));
                specifications
                    .into_iter()
                    .map(|s| (s.id, s.full_name))
                    .collect()
            }

            Step::Maintenance => {
                let mut maintenances: Vec<_> = self
                    .catalog
                    .maintenances_of_specification(parent_id(step, selections)?)
                    .await?
                    .into_iter()
                    .filter(|m| m.active)
                    .collect();
                maintenances.sort_by_key(|m| m.number);
                maintenances
                    .into_iter()
                    .map(|m| (m.id, maintenance_label(&m)))
                    .collect()
            }
        };
        Ok(candidates)
    }
}

fn parent_id(step: Step, selections: &Selections) -> Result<i64, FlowError> {
    step.parent()
        .and_then(|parent| selections[parent.index()])
        .ok_or_else(|| {
            FlowError::InvariantViolation(format!("{step} options requested without a parent"))
        })
}

/// `"{number} ({distance} км или {period} {год|года|лет})"`
pub fn maintenance_label(maintenance: &Maintenance) -> String {
    format!(
        "{} ({} км или {} {})",
        maintenance.number,
        maintenance.distance,
        maintenance.period,
        year_word(maintenance.period)
    )
}

fn year_word(period: i32) -> &'static str {
    if period > 4 {
        "лет"
    } else if period > 1 {
        "года"
    } else {
        "год"
    }
}
