//! Alpaca Wire Protocol
//!
//! Message types and the JSON codec for the subset of Alpaca's stock stream
//! protocol that the replay endpoint reproduces.

pub mod codec;
pub mod messages;

pub use codec::{CodecError, JsonCodec};
pub use messages::{
    AuthRequest, SubscribeRequest, SubscriptionMessage, SuccessKind, SuccessMessage,
};
