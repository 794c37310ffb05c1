//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the server that ties them together.

/// Alpaca wire messages and JSON codec.
pub mod alpaca;

/// Bar source adapters (CSV, in-memory).
pub mod bars;

/// Command line and settings.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// TLS WebSocket replay server.
pub mod server;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;

/// Self-signed certificate lifecycle and TLS context.
pub mod tls;
