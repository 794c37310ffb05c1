//! Bar Source Adapters
//!
//! Implementations of [`crate::application::ports::BarSource`]:
//!
//! - **Csv**: the historical export file passed on the command line
//! - **InMemory**: preloaded bars for tests

mod csv_source;
mod memory;

pub use self::csv_source::{CsvBarSource, parse_timestamp};
pub use self::memory::InMemoryBarSource;
