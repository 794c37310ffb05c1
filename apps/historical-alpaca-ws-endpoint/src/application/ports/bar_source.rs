//! Bar source port.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::streaming::BarSeries;

/// Errors raised while loading the playback sequence.
#[derive(Debug, Error)]
pub enum BarSourceError {
    /// Input file does not exist.
    #[error("bar input not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Reader failed (I/O or malformed record).
    #[error("failed to read bar input: {0}")]
    Read(String),

    /// Header row lacks a required column.
    #[error("bar input missing required column '{0}'")]
    MissingColumn(&'static str),

    /// A numeric field is not a finite float, or is negative where only
    /// non-negative values make sense.
    #[error("row {row}: field '{field}' is not a valid number: '{value}'")]
    InvalidNumber {
        /// 1-based data row (header excluded).
        row: usize,
        /// Column name.
        field: &'static str,
        /// Raw field content.
        value: String,
    },
}

/// Loads the ordered bar sequence handed to the replay server.
pub trait BarSource: Send + Sync {
    /// Load every bar, preserving source order.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is missing or a record cannot be
    /// converted into a bar.
    fn load(&self) -> Result<BarSeries, BarSourceError>;

    /// Get the name of this bar source.
    fn name(&self) -> &'static str;
}
