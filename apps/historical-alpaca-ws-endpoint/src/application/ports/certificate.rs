//! Certificate generator port.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while provisioning TLS material.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The external generator could not be launched.
    #[error("failed to launch certificate generator '{program}': {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying launch error.
        #[source]
        source: std::io::Error,
    },

    /// The external generator exited non-zero.
    #[error("certificate generator exited with {status}: {stderr}")]
    GeneratorFailed {
        /// Exit status description.
        status: String,
        /// Captured standard error of the generator.
        stderr: String,
    },

    /// In-process generation failed.
    #[error("failed to generate certificate: {0}")]
    Generation(String),

    /// Reading or writing key material failed.
    #[error("certificate I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key or certificate file could not be parsed.
    #[error("invalid certificate or key format: {0}")]
    InvalidPem(String),

    /// The TLS server context could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Produces a self-signed key and certificate pair at the given paths.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CertificateGenerator: Send + Sync {
    /// Write a PEM private key to `key_path` and a PEM certificate to
    /// `cert_path`, replacing any existing files.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails or the files cannot be written.
    async fn generate(&self, key_path: &Path, cert_path: &Path) -> Result<(), ProvisioningError>;

    /// Get the name of this generator.
    fn name(&self) -> &'static str;
}
