//! Alpaca WebSocket Message Types
//!
//! Wire format types for the scripted subset of Alpaca's market data
//! protocol that the replay endpoint speaks. Server messages are always
//! sent as single-element JSON arrays; client messages are bare objects.
//!
//! # Message Types
//!
//! ## Server -> Client
//! - `Success`: connection and authentication acknowledgments
//! - `Subscription`: subscription confirmation
//! - `Bar`: minute bars (see [`crate::domain::streaming::Bar`])
//!
//! ## Client -> Server
//! - `AuthRequest`: `{"action":"auth","key":"...","secret":"..."}`
//! - `SubscribeRequest`: `{"action":"subscribe","bars":["AAPL"]}`
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Control Messages (Server -> Client)
// =============================================================================

/// Success message indicating connection or authentication succeeded.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Message type (always "success")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Success message: "connected" or "authenticated"
    pub msg: SuccessKind,
}

/// Kind of success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessKind {
    /// Initial connection established
    Connected,
    /// Authentication successful
    Authenticated,
}

impl SuccessMessage {
    /// The greeting sent immediately after accept.
    #[must_use]
    pub fn connected() -> Self {
        Self::new(SuccessKind::Connected)
    }

    /// The reply to an accepted auth message.
    #[must_use]
    pub fn authenticated() -> Self {
        Self::new(SuccessKind::Authenticated)
    }

    fn new(msg: SuccessKind) -> Self {
        Self {
            msg_type: "success".to_string(),
            msg,
        }
    }
}

/// Subscription confirmation message.
///
/// Every channel list is always present, even when empty, because client
/// code may validate the full shape.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "subscription",
///   "bars": ["AAPL"],
///   "trades": [],
///   "quotes": [],
///   "updatedBars": [],
///   "dailyBars": [],
///   "statuses": [],
///   "lulds": [],
///   "corrections": [],
///   "cancelErrors": []
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Message type (always "subscription")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Subscribed bar symbols
    pub bars: Vec<String>,

    /// Subscribed trade symbols
    pub trades: Vec<String>,

    /// Subscribed quote symbols
    pub quotes: Vec<String>,

    /// Subscribed updated bar symbols
    #[serde(rename = "updatedBars")]
    pub updated_bars: Vec<String>,

    /// Subscribed daily bar symbols
    #[serde(rename = "dailyBars")]
    pub daily_bars: Vec<String>,

    /// Subscribed status symbols
    pub statuses: Vec<String>,

    /// Subscribed LULD symbols
    pub lulds: Vec<String>,

    /// Subscribed correction symbols
    pub corrections: Vec<String>,

    /// Subscribed cancel/error symbols
    #[serde(rename = "cancelErrors")]
    pub cancel_errors: Vec<String>,
}

impl SubscriptionMessage {
    /// Confirmation for a bars-only subscription to `symbol`.
    #[must_use]
    pub fn bars_only(symbol: &str) -> Self {
        Self {
            msg_type: "subscription".to_string(),
            bars: vec![symbol.to_string()],
            ..Default::default()
        }
    }
}

// =============================================================================
// Inbound Messages (Client -> Server)
// =============================================================================

/// Authentication request from a client.
///
/// Kept as a raw JSON object: only key presence matters, values are never
/// inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    fields: Map<String, Value>,
}

impl AuthRequest {
    /// Wrap a decoded JSON object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Check whether the object contains `key`.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
}

/// Subscription request from a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscribeRequest {
    /// Action: expected to be "subscribe"
    pub action: String,

    /// Bar symbols
    #[serde(default)]
    pub bars: Vec<String>,
}
