//! Certificate provisioning and TLS server context construction.

use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use super::CertificateMaterial;
use crate::application::ports::{CertificateGenerator, ProvisioningError};

/// Makes sure certificate material exists and turns it into a TLS acceptor.
pub struct CertificateProvisioner {
    generator: Arc<dyn CertificateGenerator>,
}

impl std::fmt::Debug for CertificateProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateProvisioner")
            .field("generator", &self.generator.name())
            .finish()
    }
}

impl CertificateProvisioner {
    /// Provisioner that uses `generator` when material is missing.
    #[must_use]
    pub fn new(generator: Arc<dyn CertificateGenerator>) -> Self {
        Self { generator }
    }

    /// Reuse existing material or generate both files, then load them.
    ///
    /// When only one of the two files is present both are regenerated.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails, the files cannot be read, or
    /// the pair does not form a valid TLS identity.
    pub async fn ensure(
        &self,
        material: &CertificateMaterial,
    ) -> Result<TlsAcceptor, ProvisioningError> {
        if material.exists() {
            tracing::info!(
                cert = %material.cert_path().display(),
                "Reusing existing certificate"
            );
        } else {
            self.generator
                .generate(material.key_path(), material.cert_path())
                .await?;
        }

        let config = server_config(material.cert_path(), material.key_path())?;
        Ok(TlsAcceptor::from(config))
    }
}

/// Build a server-side TLS context from PEM files. No client certificates
/// are requested.
///
/// # Errors
///
/// Returns an error if either file is unreadable or malformed, or if the
/// key does not match the certificate.
pub fn server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<ServerConfig>, ProvisioningError> {
    let certs = load_certs(cert_path)?;
    let key = PrivateKeyDer::from_pem_file(key_path)
        .map_err(|e| ProvisioningError::InvalidPem(format!("{}: {e}", key_path.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProvisioningError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProvisioningError::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProvisioningError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| ProvisioningError::InvalidPem(format!("{}: {e}", path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProvisioningError::InvalidPem(format!("{}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(ProvisioningError::InvalidPem(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}
