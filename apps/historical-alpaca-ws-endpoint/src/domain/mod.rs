//! Domain Layer - Core replay types and protocol rules.
//!
//! This layer contains the bar types and the session state machine with no
//! I/O. All types here are pure Rust with serialization support.

/// Replayed market data types (minute bars).
pub mod streaming;

/// Per-connection handshake state machine.
pub mod session;
