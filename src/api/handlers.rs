//! HTTP request handlers

use super::types::{WebhookAck, WebhookEnvelope};
use super::AppState;
use crate::flow::FlowError;
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

pub const WEBHOOK_PATH: &str = "/api/v1/textback/webhook/";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // TextBack webhook, with and without the trailing slash
        .route(WEBHOOK_PATH, post(textback_webhook))
        .route(WEBHOOK_PATH.trim_end_matches('/'), post(textback_webhook))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

/// Always answers 200 with `{}`; failures only show up in the logs so the
/// platform does not redeliver.
async fn textback_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    let event_id = Uuid::new_v4();
    tracing::info!(%event_id, body = %String::from_utf8_lossy(&body), "Webhook received");

    let command = serde_json::from_slice::<WebhookEnvelope>(&body)
        .map_err(|e| FlowError::validation(e.to_string()))
        .and_then(WebhookEnvelope::into_command);

    match command {
        Ok(command) => state.processor.process(event_id, command).await,
        Err(e) => tracing::warn!(%event_id, error = %e, kind = e.kind(), "Rejected webhook body"),
    }

    Json(WebhookAck::default())
}

async fn get_version() -> &'static str {
    concat!("booking-funnel ", env!("CARGO_PKG_VERSION"))
}
