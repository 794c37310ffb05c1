//! Minute Bar Types
//!
//! # Wire Format (JSON)
//! ```json
//! {
//!   "T": "b",
//!   "S": "SPY",
//!   "o": 388.985,
//!   "h": 389.13,
//!   "l": 388.975,
//!   "c": 389.12,
//!   "v": 49378.0,
//!   "t": "2021-02-22T19:15:00Z",
//!   "n": 461.0,
//!   "vw": 389.062639
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message type tag for minute bars.
pub const BAR_MESSAGE_TYPE: &str = "b";

/// One OHLCV aggregate for one instrument over one minute.
///
/// Numeric fields are kept as `f64` because the replayed feed reproduces
/// the floating point values written by the historical export verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Message type (always "b")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Open price
    #[serde(rename = "o")]
    pub open: f64,

    /// High price
    #[serde(rename = "h")]
    pub high: f64,

    /// Low price
    #[serde(rename = "l")]
    pub low: f64,

    /// Close price
    #[serde(rename = "c")]
    pub close: f64,

    /// Volume (shares)
    #[serde(rename = "v")]
    pub volume: f64,

    /// Bar start, UTC with second precision. `None` when the source
    /// timestamp could not be parsed; serialized as `null`.
    #[serde(rename = "t", with = "rfc3339_seconds")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Number of trades in bar
    #[serde(rename = "n")]
    pub trade_count: f64,

    /// Volume-weighted average price (VWAP)
    #[serde(rename = "vw")]
    pub vwap: f64,
}

impl Bar {
    /// Create a minute bar with the `"b"` message type.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn minute(
        symbol: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        timestamp: Option<DateTime<Utc>>,
        trade_count: f64,
        vwap: f64,
    ) -> Self {
        Self {
            msg_type: BAR_MESSAGE_TYPE.to_string(),
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
            timestamp,
            trade_count,
            vwap,
        }
    }
}

/// Immutable, ordered playback sequence shared by every session.
///
/// Cloning is a reference count bump; no session can mutate the bars.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Arc<[Bar]>,
}

impl BarSeries {
    /// Wrap loaded bars, preserving their order.
    #[must_use]
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars: bars.into() }
    }

    /// The tracked symbol, taken from the first bar.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.bars.first().map(|bar| bar.symbol.as_str())
    }

    /// Number of bars in the series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether the series has no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Iterate bars in playback order.
    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// Borrow the bars as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` as `YYYY-MM-DDTHH:MM:SSZ`.
mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spy_bar(timestamp: Option<DateTime<Utc>>) -> Bar {
        Bar::minute(
            "SPY", 388.985, 389.13, 388.975, 389.12, 49378.0, timestamp, 461.0, 389.062_639,
        )
    }

    #[test]
    fn serializes_wire_field_names() {
        let ts = Utc.with_ymd_and_hms(2021, 2, 22, 19, 15, 0).unwrap();
        let value = serde_json::to_value(spy_bar(Some(ts))).unwrap();

        assert_eq!(value["T"], "b");
        assert_eq!(value["S"], "SPY");
        assert_eq!(value["o"], 388.985);
        assert_eq!(value["h"], 389.13);
        assert_eq!(value["l"], 388.975);
        assert_eq!(value["c"], 389.12);
        assert_eq!(value["v"], 49378.0);
        assert_eq!(value["t"], "2021-02-22T19:15:00Z");
        assert_eq!(value["n"], 461.0);
        assert_eq!(value["vw"], 389.062_639);
        assert_eq!(value.as_object().unwrap().len(), 10);
    }

    #[test]
    fn serializes_missing_timestamp_as_null() {
        let value = serde_json::to_value(spy_bar(None)).unwrap();
        assert!(value["t"].is_null());
    }

    #[test]
    fn drops_sub_second_precision() {
        let ts = Utc.timestamp_opt(1_614_021_300, 123_456_789).single();
        let value = serde_json::to_value(spy_bar(ts)).unwrap();
        assert_eq!(value["t"], "2021-02-22T19:15:00Z");
    }

    #[test]
    fn deserializes_client_view() {
        let json = r#"{"T":"b","S":"AAPL","o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":100.0,"t":"2024-01-02T14:30:00Z","n":3.0,"vw":1.25}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.symbol, "AAPL");
        assert_eq!(
            bar.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap())
        );
    }

    #[test]
    fn series_symbol_from_first_bar() {
        let series = BarSeries::new(vec![spy_bar(None), spy_bar(None)]);
        assert_eq!(series.symbol(), Some("SPY"));
        assert_eq!(series.len(), 2);
        assert!(!series.is_empty());
    }

    #[test]
    fn empty_series_has_no_symbol() {
        let series = BarSeries::default();
        assert!(series.symbol().is_none());
        assert!(series.is_empty());
    }

    #[test]
    fn clones_share_storage() {
        let series = BarSeries::new(vec![spy_bar(None)]);
        let clone = series.clone();
        assert!(std::ptr::eq(series.as_slice(), clone.as_slice()));
    }
}
