//! Session Protocol State Machine
//!
//! Tracks one client's progress through the scripted Alpaca handshake:
//!
//! ```text
//! Connected ──auth──► Authenticated ──subscribe──► Subscribed ──► Streaming ──► Closed
//!     │                     │                          │              │
//!     └─────────────────────┴───── disconnect ─────────┴──────────────┘──► Closed
//! ```
//!
//! There is exactly one legal path. Every transition method checks the
//! current state first and anything else is a [`ProtocolViolation`], which
//! the caller answers by dropping the connection.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The only `action` value accepted in the subscribe step.
pub const SUBSCRIBE_ACTION: &str = "subscribe";

// =============================================================================
// Session State
// =============================================================================

/// Protocol state of a single client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Connection accepted and greeted; waiting for auth.
    Connected,
    /// Auth accepted; waiting for subscribe.
    Authenticated,
    /// Subscription confirmed.
    Subscribed,
    /// Bars are being replayed.
    Streaming,
    /// Terminal state.
    Closed,
}

impl SessionState {
    /// State name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        }
    }

    /// Check if the session has reached its terminal state.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A client message that does not fit the scripted handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Message arrived in the wrong state.
    #[error("unexpected {step} message in state {state}")]
    OutOfOrder {
        /// Handshake step the message tried to perform.
        step: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// Auth message is missing a required key.
    #[error("auth message missing required key '{0}'")]
    MissingAuthKey(&'static str),

    /// Subscribe step carried some other action.
    #[error("expected action 'subscribe', got '{0}'")]
    UnexpectedAction(String),

    /// Subscribe request does not include the replayed symbol.
    #[error("subscription does not include tracked symbol {symbol} (requested {requested:?})")]
    SymbolNotRequested {
        /// The server's tracked symbol.
        symbol: String,
        /// Bars symbols the client asked for.
        requested: Vec<String>,
    },

    /// Message was not valid JSON of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A binary frame was received where a text message was expected.
    #[error("non-text frame received during handshake")]
    NonTextFrame,
}

// =============================================================================
// Session
// =============================================================================

/// Handshake progress for one connection.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    symbol: Arc<str>,
}

impl Session {
    /// Start a session for a freshly accepted connection.
    #[must_use]
    pub const fn new(symbol: Arc<str>) -> Self {
        Self {
            state: SessionState::Connected,
            symbol,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The symbol this session can subscribe to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// `Connected → Authenticated`.
    ///
    /// `present` reports whether a key exists in the client's auth object.
    /// Values are not checked; any credentials are accepted.
    ///
    /// # Errors
    ///
    /// Returns a violation if the session is not in `Connected` or any of
    /// `action`, `key`, `secret` is absent.
    pub fn authenticate(
        &mut self,
        present: impl Fn(&str) -> bool,
    ) -> Result<SessionState, ProtocolViolation> {
        self.expect_state(SessionState::Connected, "auth")?;

        for key in ["action", "key", "secret"] {
            if !present(key) {
                return Err(ProtocolViolation::MissingAuthKey(key));
            }
        }

        self.advance(SessionState::Authenticated)
    }

    /// `Authenticated → Subscribed`.
    ///
    /// # Errors
    ///
    /// Returns a violation if the session is not in `Authenticated`, the
    /// action is not `subscribe`, or `bars` lacks the tracked symbol.
    pub fn subscribe(
        &mut self,
        action: &str,
        bars: &[String],
    ) -> Result<SessionState, ProtocolViolation> {
        self.expect_state(SessionState::Authenticated, "subscribe")?;

        if action != SUBSCRIBE_ACTION {
            return Err(ProtocolViolation::UnexpectedAction(action.to_string()));
        }

        if !bars.iter().any(|s| s.as_str() == &*self.symbol) {
            return Err(ProtocolViolation::SymbolNotRequested {
                symbol: self.symbol.to_string(),
                requested: bars.to_vec(),
            });
        }

        self.advance(SessionState::Subscribed)
    }

    /// `Subscribed → Streaming`.
    ///
    /// # Errors
    ///
    /// Returns a violation if the subscription has not been confirmed.
    pub fn start_streaming(&mut self) -> Result<SessionState, ProtocolViolation> {
        self.expect_state(SessionState::Subscribed, "stream")?;
        self.advance(SessionState::Streaming)
    }

    /// Any state `→ Closed`. Idempotent.
    pub fn close(&mut self) -> SessionState {
        self.state = SessionState::Closed;
        self.state
    }

    fn expect_state(
        &self,
        expected: SessionState,
        step: &'static str,
    ) -> Result<(), ProtocolViolation> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProtocolViolation::OutOfOrder {
                step,
                state: self.state,
            })
        }
    }

    fn advance(&mut self, next: SessionState) -> Result<SessionState, ProtocolViolation> {
        debug_assert!(next > self.state, "session state must only move forward");
        self.state = next;
        Ok(next)
    }
}
