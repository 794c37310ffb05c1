//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Sessions**: accepted, active, and finished sessions by outcome
//! - **Bars**: bar messages sent to clients
//! - **Latency**: session duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port when the
//! health server is enabled.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder has already been installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "replay_endpoint_sessions_accepted_total",
        "Total TCP connections accepted"
    );
    describe_gauge!(
        "replay_endpoint_sessions_active",
        "Number of sessions currently running"
    );
    describe_counter!(
        "replay_endpoint_sessions_finished_total",
        "Total sessions finished, by outcome"
    );
    describe_counter!(
        "replay_endpoint_bars_sent_total",
        "Total bar messages sent to clients"
    );
    describe_histogram!(
        "replay_endpoint_session_duration_seconds",
        "Time from accept to session end"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Every bar was sent.
    Completed,
    /// Client went away.
    Disconnected,
    /// Client broke the handshake script.
    ProtocolViolation,
    /// Server shut down mid-session.
    Shutdown,
    /// TLS or WebSocket upgrade failed.
    HandshakeFailed,
    /// Internal failure (encoding).
    Failed,
}

impl OutcomeKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::ProtocolViolation => "protocol_violation",
            Self::Shutdown => "shutdown",
            Self::HandshakeFailed => "handshake_failed",
            Self::Failed => "failed",
        }
    }
}

/// Record an accepted connection.
pub fn record_session_accepted() {
    counter!("replay_endpoint_sessions_accepted_total").increment(1);
}

/// Update the active session count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("replay_endpoint_sessions_active").set(count as f64);
}

/// Record a finished session.
pub fn record_session_finished(outcome: OutcomeKind, duration: Duration) {
    counter!(
        "replay_endpoint_sessions_finished_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "replay_endpoint_session_duration_seconds",
        "outcome" => outcome.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record one bar message sent.
pub fn record_bar_sent() {
    counter!("replay_endpoint_bars_sent_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
