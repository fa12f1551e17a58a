//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks. Readiness flips once the first best-slip report
//! has been published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    /// Whether at least one report has been published.
    pub report_published: Arc<AtomicBool>,
    /// Whether the last fetch attempt succeeded.
    pub feed_healthy: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready once a report exists; a failing feed keeps serving the last one.
    pub fn is_ready(&self) -> bool {
        self.report_published.load(Ordering::Relaxed)
    }

    pub fn mark_published(&self) {
        self.report_published.store(true, Ordering::Relaxed);
    }

    pub fn set_feed_healthy(&self, healthy: bool) {
        self.feed_healthy.store(healthy, Ordering::Relaxed);
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with the refresh loop.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_after_first_report() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.set_feed_healthy(false);
        state.mark_published();
        assert!(state.is_ready());
    }
}
