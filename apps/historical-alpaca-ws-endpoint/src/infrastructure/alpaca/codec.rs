//! Stream Codec Module
//!
//! JSON encoding and decoding for the replay endpoint's text frames.
//! Outbound messages are wrapped in a single-element array, matching what
//! Alpaca sends; inbound handshake messages are single objects.

use serde::Serialize;
use serde_json::Value;

use super::messages::{AuthRequest, SubscribeRequest};
use crate::domain::session::ProtocolViolation;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl From<CodecError> for ProtocolViolation {
    fn from(err: CodecError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Encodes outbound replay messages and decodes the client's auth and
/// subscribe requests.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode one message as a single-element JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&[message])?)
    }

    /// Decode an auth message. Any JSON object is accepted; key checks are
    /// left to the session state machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON or not an object.
    pub fn decode_auth(&self, text: &str) -> Result<AuthRequest, CodecError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(AuthRequest::new(fields)),
            other => Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Decode a subscribe message.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object with a string
    /// `action` and, when present, a string array `bars`.
    pub fn decode_subscribe(&self, text: &str) -> Result<SubscribeRequest, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
