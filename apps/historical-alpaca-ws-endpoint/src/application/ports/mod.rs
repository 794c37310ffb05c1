//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `BarSource`: Loads the historical bar sequence to replay
//! - `CertificateGenerator`: Produces the self-signed TLS key pair

mod bar_source;
mod certificate;

pub use bar_source::{BarSource, BarSourceError};
#[cfg(test)]
pub use certificate::MockCertificateGenerator;
pub use certificate::{CertificateGenerator, ProvisioningError};
