//! In-process self-signed certificate generation.
//!
//! Used where no `openssl` binary is available. Produces an ECDSA P-256
//! key with the same subject the command line generator uses, plus SANs
//! for `localhost` and `127.0.0.1` so clients connecting by either name
//! can verify it.

use std::path::Path;

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use super::DEFAULT_VALIDITY_DAYS;
use crate::application::ports::{CertificateGenerator, ProvisioningError};

/// Names the certificate is valid for.
const SUBJECT_ALT_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

/// PEM encoded key and certificate.
#[derive(Debug, Clone)]
pub struct PemPair {
    /// PKCS#8 private key.
    pub key: String,
    /// X.509 certificate.
    pub cert: String,
}

/// Generates certificates with `rcgen`.
#[derive(Debug, Clone, Copy)]
pub struct RcgenGenerator {
    validity_days: u32,
}

impl Default for RcgenGenerator {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

impl RcgenGenerator {
    /// Generator with the default validity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the certificate validity.
    #[must_use]
    pub const fn with_validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Render a fresh key and certificate without touching the file system.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Generation`] if key generation or
    /// signing fails.
    pub fn render(&self) -> Result<PemPair, ProvisioningError> {
        let key_pair =
            KeyPair::generate().map_err(|e| ProvisioningError::Generation(e.to_string()))?;

        let sans: Vec<String> = SUBJECT_ALT_NAMES.iter().map(|s| (*s).to_string()).collect();
        let mut params = CertificateParams::new(sans)
            .map_err(|e| ProvisioningError::Generation(e.to_string()))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "US");
        dn.push(DnType::StateOrProvinceName, "State");
        dn.push(DnType::LocalityName, "City");
        dn.push(DnType::OrganizationName, "Organization");
        dn.push(DnType::CommonName, "localhost");
        params.distinguished_name = dn;

        let today = Utc::now().date_naive();
        let expiry = today
            .checked_add_days(Days::new(u64::from(self.validity_days)))
            .ok_or_else(|| ProvisioningError::Generation("validity overflows".to_string()))?;
        let (year, month, day) = ymd(today)?;
        params.not_before = rcgen::date_time_ymd(year, month, day);
        let (year, month, day) = ymd(expiry)?;
        params.not_after = rcgen::date_time_ymd(year, month, day);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| ProvisioningError::Generation(e.to_string()))?;

        Ok(PemPair {
            key: key_pair.serialize_pem(),
            cert: cert.pem(),
        })
    }
}

fn ymd(date: NaiveDate) -> Result<(i32, u8, u8), ProvisioningError> {
    let month = u8::try_from(date.month())
        .map_err(|e| ProvisioningError::Generation(e.to_string()))?;
    let day =
        u8::try_from(date.day()).map_err(|e| ProvisioningError::Generation(e.to_string()))?;
    Ok((date.year(), month, day))
}

#[async_trait]
impl CertificateGenerator for RcgenGenerator {
    async fn generate(&self, key_path: &Path, cert_path: &Path) -> Result<(), ProvisioningError> {
        tracing::info!(days = self.validity_days, "Generating self-signed certificate");

        let pair = self.render()?;
        // Synchronous: no write may still be pending once this future is dropped.
        std::fs::write(key_path, pair.key.as_bytes())?;
        std::fs::write(cert_path, pair.cert.as_bytes())?;

        tracing::info!(path = %cert_path.display(), "Generated certificate");
        tracing::info!(path = %key_path.display(), "Generated key");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rcgen"
    }
}
