//! Command line surface.
//!
//! Every option can also come from the environment (or a `.env` file loaded
//! before parsing). Command line arguments take precedence.
//!
//! | Variable                | Default   | Description                      |
//! |-------------------------|-----------|----------------------------------|
//! | `REPLAY_CSV_PATH`       |           | CSV bar input                    |
//! | `REPLAY_DELAY_SECS`     | `1.0`     | Pause after each bar (seconds)   |
//! | `REPLAY_CERT_DIR`       | `.`       | Directory for key and certificate|
//! | `REPLAY_CERT_GENERATOR` | `openssl` | `openssl` or `rcgen`             |
//! | `REPLAY_HEALTH_PORT`    | `0`       | Health server port, 0 disables   |

use std::path::PathBuf;

use clap::Parser;

use super::settings::{
    CertGeneratorKind, CertificateSettings, ConfigError, DEFAULT_DELAY_SECS, EndpointConfig,
    ServerSettings, parse_delay,
};

/// Replay historical minute bars over an Alpaca-compatible secure WebSocket.
#[derive(Debug, Parser)]
#[command(name = "historical_alpaca_ws_endpoint", version)]
pub struct Cli {
    /// CSV file with the bars to replay.
    #[arg(env = "REPLAY_CSV_PATH")]
    pub csv_path: PathBuf,

    /// Seconds to wait after each bar.
    #[arg(long, default_value_t = DEFAULT_DELAY_SECS, env = "REPLAY_DELAY_SECS")]
    pub delay: f64,

    /// Directory where `server.key` and `server.crt` are created.
    #[arg(long, default_value = ".", env = "REPLAY_CERT_DIR")]
    pub cert_dir: PathBuf,

    /// How to generate missing certificates.
    #[arg(long, value_enum, default_value_t = CertGeneratorKind::Openssl, env = "REPLAY_CERT_GENERATOR")]
    pub cert_generator: CertGeneratorKind,

    /// Loopback port for `/health` and `/metrics` (0 = disabled).
    #[arg(long, default_value_t = 0, env = "REPLAY_HEALTH_PORT")]
    pub health_port: u16,
}

impl Cli {
    /// Resolve parsed arguments into a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDelay`] if the delay is negative or not
    /// finite.
    pub fn into_config(self) -> Result<EndpointConfig, ConfigError> {
        let server = ServerSettings {
            delay: parse_delay(self.delay)?,
            ..ServerSettings::default()
        };

        let certificates = CertificateSettings {
            dir: self.cert_dir,
            generator: self.cert_generator,
            ..CertificateSettings::default()
        };

        Ok(EndpointConfig {
            csv_path: self.csv_path,
            server,
            certificates,
            health_port: self.health_port,
        })
    }
}
