//! Health Check and Metrics Endpoint
//!
//! Optional loopback HTTP server for checking on a running replay.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status: symbol, bar count, session counters
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::server::{SessionStats, StatsSnapshot};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Endpoint version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Symbol being replayed.
    pub symbol: String,
    /// Bars per replay.
    pub bar_count: usize,
    /// Session counters.
    pub sessions: StatsSnapshot,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting connections.
    Healthy,
    /// Shutting down; no new sessions.
    Draining,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    symbol: String,
    bar_count: usize,
    stats: Arc<SessionStats>,
    shutdown: CancellationToken,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        symbol: String,
        bar_count: usize,
        stats: Arc<SessionStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            symbol,
            bar_count,
            stats,
            shutdown,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
pub struct HealthServer {
    addr: SocketAddr,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(
        addr: SocketAddr,
        state: Arc<HealthServerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.addr, e.to_string()))?;

        tracing::info!(addr = %self.addr, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_health_response(&state)))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let status = if state.shutdown.is_cancelled() {
        HealthStatus::Draining
    } else {
        HealthStatus::Healthy
    };

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        symbol: state.symbol.clone(),
        bar_count: state.bar_count,
        sessions: state.stats.snapshot(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind.
    #[error("failed to bind health server to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
