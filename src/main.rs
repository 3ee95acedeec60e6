//! Booking funnel - TextBack appointment booking service
//!
//! Walks a chat user through city, brand, model, generation,
//! specification and maintenance selection with inline buttons, then
//! hands over a booking link.

mod api;
mod cache;
mod chain;
mod config;
mod db;
mod flow;
mod textback;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use flow::{DatabaseStorage, ExpirySweeper, FlowProcessor, FlowServices};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use textback::TextBackClient;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_funnel=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let transport = TextBackClient::new(
        &config.textback_api_url,
        config.textback_api_token.clone(),
        config.textback_timeout,
    )?;
    if config.textback_api_token.is_none() {
        tracing::warn!("TEXTBACK_API_TOKEN not set, outbound messages will be unauthenticated");
    }

    let services = FlowServices::with_database(DatabaseStorage::new(db), Arc::new(transport));
    let settings = config.flow_settings();
    let sweeper = Arc::new(ExpirySweeper::new(services.clone(), &settings));

    // One-shot sweep for cron
    if std::env::args().nth(1).as_deref() == Some("sweep") {
        let report = sweeper.sweep().await?;
        tracing::info!(?report, "Sweep finished");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let sweeper_handle = config.sweep_interval.map(|period| {
        tracing::info!(period_secs = period.as_secs(), "Starting expiry sweeper");
        sweeper.clone().spawn_periodic(period, cancel.clone())
    });

    let state = AppState::new(FlowProcessor::new(services, &settings));
    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Booking funnel listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(handle) = sweeper_handle {
        handle.await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
