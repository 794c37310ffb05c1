//! Endpoint Configuration Settings
//!
//! Resolved configuration handed from the CLI layer to the server, the
//! certificate provisioner and the health server.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::tls::{
    CERT_FILE_NAME, CertificateMaterial, DEFAULT_KEY_BITS, DEFAULT_VALIDITY_DAYS, KEY_FILE_NAME,
};

/// Port the endpoint listens on.
pub const DEFAULT_PORT: u16 = 8765;

/// Default pause between bars, in seconds.
pub const DEFAULT_DELAY_SECS: f64 = 1.0;

/// Certificate generator backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CertGeneratorKind {
    /// `openssl req -x509` subprocess.
    #[default]
    Openssl,
    /// In-process generation with rcgen.
    Rcgen,
}

impl CertGeneratorKind {
    /// Get the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Openssl => "openssl",
            Self::Rcgen => "rcgen",
        }
    }
}

/// Listener and pacing settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address the TLS listener binds.
    pub listen_addr: SocketAddr,
    /// Pause after each bar.
    pub delay: Duration,
    /// How long a graceful shutdown waits for sessions to drain.
    pub shutdown_timeout: Duration,
    /// How long to wait for the peer's reply to our close frame.
    pub close_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
            shutdown_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Where certificates live and how they are produced.
#[derive(Debug, Clone)]
pub struct CertificateSettings {
    /// Directory holding the key and certificate.
    pub dir: PathBuf,
    /// Private key file name.
    pub key_file: String,
    /// Certificate file name.
    pub cert_file: String,
    /// Generator used when the files are missing.
    pub generator: CertGeneratorKind,
    /// Executable for the openssl generator.
    pub openssl_program: String,
    /// RSA key size for the openssl generator.
    pub key_bits: u32,
    /// Certificate validity.
    pub validity_days: u32,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            key_file: KEY_FILE_NAME.to_string(),
            cert_file: CERT_FILE_NAME.to_string(),
            generator: CertGeneratorKind::default(),
            openssl_program: "openssl".to_string(),
            key_bits: DEFAULT_KEY_BITS,
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

impl CertificateSettings {
    /// Process-scoped material for these settings.
    #[must_use]
    pub fn material(&self) -> CertificateMaterial {
        CertificateMaterial::new(self.dir.join(&self.key_file), self.dir.join(&self.cert_file))
    }
}

/// Complete endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// CSV bar input.
    pub csv_path: PathBuf,
    /// Listener and pacing settings.
    pub server: ServerSettings,
    /// Certificate settings.
    pub certificates: CertificateSettings,
    /// Health server port (0 = disabled).
    pub health_port: u16,
}

impl EndpointConfig {
    /// Configuration with defaults for everything but the input path.
    #[must_use]
    pub fn new(csv_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            server: ServerSettings::default(),
            certificates: CertificateSettings::default(),
            health_port: 0,
        }
    }

    /// Health server address, if enabled.
    #[must_use]
    pub const fn health_addr(&self) -> Option<SocketAddr> {
        if self.health_port == 0 {
            None
        } else {
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                self.health_port,
            )))
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// Delay is negative, NaN or infinite.
    #[error("delay must be a finite, non-negative number of seconds, got {0}")]
    InvalidDelay(f64),
}

/// Convert a delay in seconds into a [`Duration`].
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDelay`] for negative or non-finite input.
pub fn parse_delay(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDelay(secs))
}
