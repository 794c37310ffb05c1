#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Historical Alpaca WebSocket Endpoint - Market Data Replay
//!
//! A TLS WebSocket server that replays historical minute bars from a CSV
//! export while speaking the Alpaca stock stream handshake, so client code
//! under test can run against recorded data.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Bar types and the handshake state machine
//!   - `streaming`: `Bar` and the shared read-only `BarSeries`
//!   - `session`: `Connected -> Authenticated -> Subscribed -> Streaming -> Closed`
//!
//! - **Application**: Port definitions
//!   - `ports`: bar source and certificate generator interfaces
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: wire messages and JSON codec
//!   - `bars`: CSV and in-memory bar sources
//!   - `tls`: self-signed certificate lifecycle and rustls context
//!   - `server`: accept loop, per-connection sessions, paced streamer
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Protocol
//!
//! ```text
//! client                                server
//!   |  <---- [{"T":"success","msg":"connected"}]
//!   |  {"action":"auth","key":..,"secret":..} ---->
//!   |  <---- [{"T":"success","msg":"authenticated"}]
//!   |  {"action":"subscribe","bars":["AAPL"]} ---->
//!   |  <---- [{"T":"subscription","bars":["AAPL"],...}]
//!   |  <---- [{"T":"b","S":"AAPL",...}]   (one per bar, paced)
//!   |  <---- close 1000
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core replay types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Startup error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::session::{ProtocolViolation, Session, SessionState};
pub use domain::streaming::{Bar, BarSeries};

// Ports
pub use application::ports::{
    BarSource, BarSourceError, CertificateGenerator, ProvisioningError,
};

// Errors
pub use error::EndpointError;

// Infrastructure config
pub use infrastructure::config::{
    CertGeneratorKind, CertificateSettings, Cli, ConfigError, EndpointConfig, ServerSettings,
};

// Bar sources
pub use infrastructure::bars::{CsvBarSource, InMemoryBarSource};

// TLS
pub use infrastructure::tls::{
    CertificateMaterial, CertificateProvisioner, OpensslGenerator, RcgenGenerator, generator_for,
};

// Server
pub use infrastructure::server::{ReplayServer, ServerError, SessionStats};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
