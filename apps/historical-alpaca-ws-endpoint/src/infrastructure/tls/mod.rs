//! TLS Certificate Lifecycle
//!
//! The endpoint only speaks `wss://`. At startup it reuses an existing
//! `server.key`/`server.crt` pair or generates a self-signed one, builds a
//! rustls server context from it, and removes both files when the process
//! exits.
//!
//! # Generators
//!
//! - **openssl**: `openssl req -x509 -newkey rsa:4096 ... -nodes`
//! - **rcgen**: in-process ECDSA P-256, no external binary needed

mod material;
mod openssl;
mod provisioner;
mod self_signed;

use std::sync::Arc;

pub use self::material::{CERT_FILE_NAME, CertificateMaterial, KEY_FILE_NAME};
pub use self::openssl::OpensslGenerator;
pub use self::provisioner::{CertificateProvisioner, server_config};
pub use self::self_signed::{PemPair, RcgenGenerator};

use crate::application::ports::CertificateGenerator;
use crate::infrastructure::config::{CertGeneratorKind, CertificateSettings};

/// RSA key size for generated certificates.
pub const DEFAULT_KEY_BITS: u32 = 4096;

/// Validity of generated certificates.
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Subject of generated certificates.
pub const DEFAULT_SUBJECT: &str = "/C=US/ST=State/L=City/O=Organization/CN=localhost";

/// Build the generator selected in `settings`.
#[must_use]
pub fn generator_for(settings: &CertificateSettings) -> Arc<dyn CertificateGenerator> {
    match settings.generator {
        CertGeneratorKind::Openssl => Arc::new(
            OpensslGenerator::new()
                .with_program(settings.openssl_program.clone())
                .with_key_bits(settings.key_bits)
                .with_validity_days(settings.validity_days),
        ),
        CertGeneratorKind::Rcgen => {
            Arc::new(RcgenGenerator::new().with_validity_days(settings.validity_days))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_generator_by_kind() {
        let mut settings = CertificateSettings::default();
        assert_eq!(generator_for(&settings).name(), "openssl");

        settings.generator = CertGeneratorKind::Rcgen;
        assert_eq!(generator_for(&settings).name(), "rcgen");
    }
}
