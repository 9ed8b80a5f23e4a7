//! HTTP server lifecycle: bind → spawn background task → return a handle
//! with a shutdown channel.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::error::OnboardingError;

use super::router::{onboarding_router, AppState};

/// Handle to a running onboarding server.
pub struct OnboardingServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl OnboardingServer {
    /// Shut down the server gracefully. Safe to call once; later calls
    /// are no-ops.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Onboarding server shutdown signal sent");
        }
    }
}

impl Drop for OnboardingServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind the given address (port 0 for ephemeral), mount the router, and
/// serve in a background task.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
) -> Result<OnboardingServer, OnboardingError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| OnboardingError::ConnectionFailed(format!("cannot bind {addr}: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| OnboardingError::ConnectionFailed(e.to_string()))?;

    let app = onboarding_router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Onboarding server received shutdown signal");
        };
        tracing::info!(%addr, "Onboarding server started");
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Onboarding server error: {e}");
        }
        tracing::info!("Onboarding server stopped");
    });

    Ok(OnboardingServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::RuleClassifier;
    use crate::error::OnboardingError;
    use crate::events::listener::{EventListener, ReconnectPolicy};
    use crate::events::Event;
    use crate::extract::{DocumentCollaborator, DocumentMessage, TabularCollaborator};
    use crate::models::PortfolioItem;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct NoTabular;

    #[async_trait]
    impl TabularCollaborator for NoTabular {
        async fn extract_portfolio(
            &self,
            _path: &Path,
        ) -> Result<Vec<PortfolioItem>, OnboardingError> {
            Ok(Vec::new())
        }
    }

    struct NoDocument;

    #[async_trait]
    impl DocumentCollaborator for NoDocument {
        async fn extract_document(
            &self,
            _path: &Path,
        ) -> Result<mpsc::Receiver<DocumentMessage>, OnboardingError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Arc::new(NoTabular),
            Arc::new(NoDocument),
            Arc::new(RuleClassifier),
            dir.path().to_path_buf(),
        );
        (state, dir)
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let (state, _dir) = test_state();
        let mut server = start_server(state, loopback()).await.unwrap();
        assert_ne!(server.addr.port(), 0);

        let url = format!("http://{}/api/health", server.addr);
        let response = reqwest::get(&url).await.unwrap();
        assert!(response.status().is_success());

        server.shutdown();
        server.shutdown();
    }

    /// Full wire round trip: server-side broadcast → SSE framing →
    /// listener parsing and dispatch.
    #[tokio::test]
    async fn listener_receives_published_events_over_http() {
        let (state, _dir) = test_state();
        let session = state.sessions.create().unwrap();
        let server = start_server(state.clone(), loopback()).await.unwrap();

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let url = format!(
            "http://{}/api/onboarding/stream/{}",
            server.addr, session.id
        );
        let handle = EventListener::new(url)
            .with_policy(ReconnectPolicy {
                base_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(200),
                max_attempts: 3,
            })
            .on_any(move |envelope| {
                sink.lock().unwrap().push(envelope.event.kind().to_string());
            })
            .spawn();

        // Give the listener time to attach, then publish
        tokio::time::sleep(Duration::from_millis(200)).await;
        state.broadcaster.publish(
            session.id,
            Event::Status {
                file: "holdings.csv".to_string(),
                progress: 50,
                message: "halfway".to_string(),
            },
        );

        let mut kinds = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            kinds = seen.lock().unwrap().clone();
            if kinds.contains(&"status".to_string()) {
                break;
            }
        }
        handle.disconnect();
        assert_eq!(kinds.first().map(String::as_str), Some("connected"));
        assert!(kinds.contains(&"status".to_string()));
    }
}
