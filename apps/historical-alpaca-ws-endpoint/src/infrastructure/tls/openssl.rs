//! Self-signed certificate generation through the `openssl` command line
//! tool.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::{DEFAULT_KEY_BITS, DEFAULT_SUBJECT, DEFAULT_VALIDITY_DAYS};
use crate::application::ports::{CertificateGenerator, ProvisioningError};

/// Runs `openssl req -x509` to produce an RSA key and certificate.
#[derive(Debug, Clone)]
pub struct OpensslGenerator {
    program: String,
    key_bits: u32,
    validity_days: u32,
    subject: String,
}

impl Default for OpensslGenerator {
    fn default() -> Self {
        Self {
            program: "openssl".to_string(),
            key_bits: DEFAULT_KEY_BITS,
            validity_days: DEFAULT_VALIDITY_DAYS,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl OpensslGenerator {
    /// Generator with the default program, key size, validity and subject.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the executable (tests, non-standard installs).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Override the RSA key size.
    #[must_use]
    pub const fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    /// Override the certificate validity.
    #[must_use]
    pub const fn with_validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    fn args(&self, key_path: &Path, cert_path: &Path) -> Vec<String> {
        vec![
            "req".to_string(),
            "-x509".to_string(),
            "-newkey".to_string(),
            format!("rsa:{}", self.key_bits),
            "-keyout".to_string(),
            key_path.display().to_string(),
            "-out".to_string(),
            cert_path.display().to_string(),
            "-days".to_string(),
            self.validity_days.to_string(),
            "-nodes".to_string(),
            "-subj".to_string(),
            self.subject.clone(),
        ]
    }
}

#[async_trait]
impl CertificateGenerator for OpensslGenerator {
    async fn generate(&self, key_path: &Path, cert_path: &Path) -> Result<(), ProvisioningError> {
        tracing::info!(
            program = %self.program,
            key_bits = self.key_bits,
            days = self.validity_days,
            "Generating self-signed certificate"
        );

        let output = Command::new(&self.program)
            .args(self.args(key_path, cert_path))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProvisioningError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(status = %output.status, stderr = %stderr, "Failed to generate certificate");
            return Err(ProvisioningError::GeneratorFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        tracing::info!(path = %cert_path.display(), "Generated certificate");
        tracing::info!(path = %key_path.display(), "Generated key");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "openssl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_req_arguments() {
        let generator = OpensslGenerator::new();
        let args = generator.args(Path::new("k.pem"), Path::new("c.pem"));
        assert_eq!(
            args,
            vec![
                "req",
                "-x509",
                "-newkey",
                "rsa:4096",
                "-keyout",
                "k.pem",
                "-out",
                "c.pem",
                "-days",
                "365",
                "-nodes",
                "-subj",
                "/C=US/ST=State/L=City/O=Organization/CN=localhost",
            ]
        );
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let generator = OpensslGenerator::new().with_program("/nonexistent/openssl-binary");

        let err = generator
            .generate(&dir.path().join("k"), &dir.path().join("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_generator_failure() {
        let dir = tempfile::tempdir().unwrap();
        let generator = OpensslGenerator::new().with_program("false");

        let err = generator
            .generate(&dir.path().join("k"), &dir.path().join("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::GeneratorFailed { .. }));
    }

    #[tokio::test]
    async fn real_openssl_writes_pem_pair() {
        if std::process::Command::new("openssl")
            .arg("version")
            .output()
            .is_err()
        {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("server.key");
        let cert = dir.path().join("server.crt");
        // Smaller key keeps the test fast; the argument plumbing is the same.
        OpensslGenerator::new()
            .with_key_bits(2048)
            .generate(&key, &cert)
            .await
            .unwrap();

        let cert_pem = std::fs::read_to_string(&cert).unwrap();
        let key_pem = std::fs::read_to_string(&key).unwrap();
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("PRIVATE KEY"));
    }
}
