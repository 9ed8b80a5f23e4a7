//! Fundflow: a portfolio onboarding engine.
//!
//! Sessions walk a staged workflow — upload portfolio files and fund
//! documents, extract holdings concurrently through an external
//! extraction service, then categorize every fund with a review loop
//! (questions, overrides, approvals). Progress streams to clients as
//! server-sent events with a reconnecting listener on the other side.

pub mod api;
pub mod categorize;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod models;
pub mod session;
pub mod upload;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::categorize::RuleClassifier;
use crate::error::OnboardingError;
use crate::extract::ExtractionServiceClient;

/// Initialize logging and run the server until interrupted.
pub async fn run() -> Result<(), OnboardingError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Fundflow starting v{}", env!("CARGO_PKG_VERSION"));

    let extraction = Arc::new(ExtractionServiceClient::new(
        config::extraction_service_url(),
    ));
    let state = AppState::new(
        extraction.clone(),
        extraction,
        Arc::new(RuleClassifier),
        config::uploads_dir(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config::DEFAULT_PORT));
    let mut server = api::start_server(state, addr).await?;
    tracing::info!(addr = %server.addr, "Fundflow listening");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| OnboardingError::ConnectionFailed(format!("signal handler: {e}")))?;
    server.shutdown();
    Ok(())
}
