//! Button token payloads
//!
//! A chat button can only carry a short opaque string. The full selection
//! delta lives in the token cache under a key derived from the payload
//! content, so rebuilding the same option always yields the same token.

use crate::chain::{Selections, Step};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const PAYLOAD_TYPE_APPOINTMENT: &str = "appointment";

/// Structured payload behind a button token.
///
/// Field order is the canonical serialization order and must not change:
/// tokens already handed to chat clients are digests of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_id: Option<i64>,
}

impl CachedPayload {
    /// Payload for one candidate of `step`, carrying the chain's resolved
    /// ancestors
    pub fn for_candidate(
        appointment_id: i64,
        ancestors: &Selections,
        step: Step,
        candidate_id: i64,
    ) -> Self {
        let mut selections = [None; Step::COUNT];
        selections[..step.index()].copy_from_slice(&ancestors[..step.index()]);
        selections[step.index()] = Some(candidate_id);
        Self::from_selections(Some(appointment_id), &selections)
    }

    pub fn from_selections(appointment_id: Option<i64>, selections: &Selections) -> Self {
        Self {
            kind: PAYLOAD_TYPE_APPOINTMENT.to_string(),
            appointment_id,
            city_id: selections[Step::City.index()],
            brand_id: selections[Step::Brand.index()],
            model_id: selections[Step::Model.index()],
            generation_id: selections[Step::Generation.index()],
            specification_id: selections[Step::Specification.index()],
            maintenance_id: selections[Step::Maintenance.index()],
        }
    }

    pub fn selections(&self) -> Selections {
        [
            self.city_id,
            self.brand_id,
            self.model_id,
            self.generation_id,
            self.specification_id,
            self.maintenance_id,
        ]
    }

    /// Canonical bytes the token is derived from
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Plain struct of strings and integers; serialization cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Content-addressed token: unpadded URL-safe base64 of SHA-256
    pub fn token(&self) -> String {
        let digest = Sha256::digest(self.canonical_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
