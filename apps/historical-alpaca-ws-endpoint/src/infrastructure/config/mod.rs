//! Configuration Module
//!
//! Command line parsing and the resolved settings for the endpoint.

mod cli;
mod settings;

pub use cli::Cli;
pub use settings::{
    CertGeneratorKind, CertificateSettings, ConfigError, DEFAULT_DELAY_SECS, DEFAULT_PORT,
    EndpointConfig, ServerSettings, parse_delay,
};
