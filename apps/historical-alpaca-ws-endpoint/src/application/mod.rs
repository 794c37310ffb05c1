//! Application Layer - Port definitions.
//!
//! This layer contains the port interfaces that define how the replay
//! server interacts with bar storage and certificate tooling.

/// Port interfaces for external systems (bar input, certificate generation).
pub mod ports;
