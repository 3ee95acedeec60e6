//! HTTP API for the booking funnel

mod handlers;
mod types;

pub use handlers::create_router;

use crate::flow::FlowProcessor;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<FlowProcessor>,
}

impl AppState {
    pub fn new(processor: FlowProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}
