//! Startup errors.
//!
//! Session failures never reach this level; they end their own connection
//! and are only logged. Everything here aborts startup with exit code 1.

use thiserror::Error;

use crate::application::ports::{BarSourceError, ProvisioningError};
use crate::infrastructure::config::ConfigError;
use crate::infrastructure::server::ServerError;

/// Errors that stop the endpoint from starting.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Invalid command line or environment settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The bar input could not be loaded.
    #[error(transparent)]
    BarSource(#[from] BarSourceError),

    /// The input loaded but contained no bars.
    #[error("bar input contains no rows; nothing to replay")]
    NoBars,

    /// TLS material could not be provisioned.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The listener could not be started.
    #[error(transparent)]
    Server(#[from] ServerError),
}
