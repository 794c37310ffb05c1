//! CSV bar source.
//!
//! Reads the export written by the historical bar download tool: one
//! header row, then one minute bar per row with at least the columns
//! `symbol, timestamp, open, high, low, close, volume, trade_count, vwap`.
//! Extra columns are ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SubsecRound, TimeZone, Utc};
use csv::StringRecord;

use crate::application::ports::{BarSource, BarSourceError};
use crate::domain::streaming::{Bar, BarSeries};

/// Columns every input file must carry.
const REQUIRED_COLUMNS: [&str; 9] = [
    "symbol",
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "trade_count",
    "vwap",
];

/// Position of `vwap` in [`REQUIRED_COLUMNS`].
const VWAP_COLUMN: usize = 8;

/// Offset-aware layouts tried after RFC 3339.
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];

/// Naive layouts, interpreted in the host's local time zone.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Loads bars from a CSV file.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    path: PathBuf,
}

impl CsvBarSource {
    /// Create a source for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this source reads from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BarSource for CsvBarSource {
    fn load(&self) -> Result<BarSeries, BarSourceError> {
        if !self.path.exists() {
            return Err(BarSourceError::NotFound(self.path.clone()));
        }

        tracing::info!(path = %self.path.display(), "Loading bars");

        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| BarSourceError::Read(e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| BarSourceError::Read(e.to_string()))?
            .clone();
        let columns = ColumnIndex::resolve(&headers)?;

        let mut bars = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| BarSourceError::Read(e.to_string()))?;
            bars.push(columns.to_bar(&record, idx + 1)?);
        }

        tracing::info!(count = bars.len(), "Loaded bars");

        Ok(BarSeries::new(bars))
    }

    fn name(&self) -> &'static str {
        "Csv"
    }
}

/// Header positions of the required columns.
struct ColumnIndex {
    positions: [usize; REQUIRED_COLUMNS.len()],
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self, BarSourceError> {
        let mut positions = [0; REQUIRED_COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == column)
                .ok_or(BarSourceError::MissingColumn(column))?;
        }
        Ok(Self { positions })
    }

    fn field<'r>(&self, record: &'r StringRecord, column: usize) -> &'r str {
        record.get(self.positions[column]).unwrap_or_default()
    }

    fn number(
        &self,
        record: &StringRecord,
        column: usize,
        row: usize,
    ) -> Result<f64, BarSourceError> {
        let raw = self.field(record, column);
        // Prices, volume and trade count must not be negative; vwap may be.
        let signed = column == VWAP_COLUMN;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && (signed || *v >= 0.0))
            .ok_or_else(|| BarSourceError::InvalidNumber {
                row,
                field: REQUIRED_COLUMNS[column],
                value: raw.to_string(),
            })
    }

    fn to_bar(&self, record: &StringRecord, row: usize) -> Result<Bar, BarSourceError> {
        let raw_timestamp = self.field(record, 1);
        let timestamp = match parse_timestamp(raw_timestamp) {
            Ok(ts) => Some(ts),
            Err(e) => {
                tracing::warn!(
                    row,
                    timestamp = %raw_timestamp,
                    error = %e,
                    "Failed to parse timestamp"
                );
                None
            }
        };

        Ok(Bar::minute(
            self.field(record, 0),
            self.number(record, 2, row)?,
            self.number(record, 3, row)?,
            self.number(record, 4, row)?,
            self.number(record, 5, row)?,
            self.number(record, 6, row)?,
            timestamp,
            self.number(record, 7, row)?,
            self.number(record, 8, row)?,
        ))
    }
}

/// Parse an ISO 8601 timestamp into UTC, truncated to whole seconds.
///
/// A space may separate date and time. Timestamps without an offset are
/// taken as local time.
///
/// # Errors
///
/// Returns a description of the failure if no supported layout matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let normalized = raw.trim().replace(' ', "T");

    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(ts.with_timezone(&Utc).trunc_subsecs(0));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(&normalized, format) {
            return Ok(ts.with_timezone(&Utc).trunc_subsecs(0));
        }
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("invalid ISO 8601 timestamp '{raw}'"))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(0))
        .ok_or_else(|| format!("local time '{raw}' does not exist"))
}
