//! Per-connection session driver.
//!
//! Runs the scripted handshake on top of the [`Session`] state machine and
//! hands the socket to the [`BarStreamer`] once the subscription is
//! confirmed. Any message that does not fit the script ends the session
//! with a policy-violation close frame and no Alpaca error message.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::stats::SessionStats;
use super::streamer::{BarStreamer, StreamOutcome};
use crate::domain::session::{ProtocolViolation, Session, SessionState};
use crate::domain::streaming::BarSeries;
use crate::infrastructure::alpaca::{CodecError, JsonCodec, SubscriptionMessage, SuccessMessage};
use crate::infrastructure::metrics::OutcomeKind;

/// Everything a session needs, shared by all sessions of one server.
#[derive(Debug)]
pub struct SessionContext {
    /// Bars replayed to every subscriber.
    pub bars: BarSeries,
    /// The one symbol clients may subscribe to.
    pub symbol: Arc<str>,
    /// Pause after each bar.
    pub delay: Duration,
    /// How long to wait for the peer's close reply.
    pub close_timeout: Duration,
    /// Cancelled when the server begins a graceful shutdown.
    pub shutdown: CancellationToken,
    /// Shared counters.
    pub stats: Arc<SessionStats>,
}

/// Why the handshake stopped early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Client broke the script.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// Send or receive failed, or the client closed.
    #[error("transport disconnect: {0}")]
    TransportDisconnect(String),

    /// Server shutdown began.
    #[error("server shutting down")]
    Shutdown,

    /// An outbound message could not be encoded.
    #[error(transparent)]
    Encode(#[from] CodecError),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every bar was delivered.
    Completed {
        /// Bars sent.
        bars_sent: usize,
    },
    /// Client went away.
    Disconnected {
        /// State when the transport failed.
        state: SessionState,
        /// Bars sent before the disconnect.
        bars_sent: usize,
        /// What the transport reported.
        reason: String,
    },
    /// Client broke the handshake script.
    ProtocolViolation {
        /// State the violation occurred in.
        state: SessionState,
        /// The violation.
        violation: ProtocolViolation,
    },
    /// Server shut down first.
    Shutdown {
        /// State at shutdown.
        state: SessionState,
        /// Bars sent before shutdown.
        bars_sent: usize,
    },
    /// TLS or WebSocket upgrade failed before the session began.
    HandshakeFailed(String),
    /// Internal failure.
    Failed(String),
}

impl SessionOutcome {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Completed { .. } => OutcomeKind::Completed,
            Self::Disconnected { .. } => OutcomeKind::Disconnected,
            Self::ProtocolViolation { .. } => OutcomeKind::ProtocolViolation,
            Self::Shutdown { .. } => OutcomeKind::Shutdown,
            Self::HandshakeFailed(_) => OutcomeKind::HandshakeFailed,
            Self::Failed(_) => OutcomeKind::Failed,
        }
    }

    /// Bars sent before the session ended.
    #[must_use]
    pub const fn bars_sent(&self) -> usize {
        match self {
            Self::Completed { bars_sent }
            | Self::Disconnected { bars_sent, .. }
            | Self::Shutdown { bars_sent, .. } => *bars_sent,
            Self::ProtocolViolation { .. } | Self::HandshakeFailed(_) | Self::Failed(_) => 0,
        }
    }

    /// Log the outcome at the level it deserves.
    pub fn log(&self) {
        match self {
            Self::Completed { bars_sent } => {
                tracing::info!(bars_sent, "Replay complete, session closed");
            }
            Self::Disconnected {
                state,
                bars_sent,
                reason,
            } => {
                tracing::info!(%state, bars_sent, reason = %reason, "Client disconnected");
            }
            Self::ProtocolViolation { state, violation } => {
                tracing::warn!(%state, error = %violation, "Protocol violation, dropping connection");
            }
            Self::Shutdown { state, bars_sent } => {
                tracing::info!(%state, bars_sent, "Session closed for shutdown");
            }
            Self::HandshakeFailed(reason) => {
                tracing::warn!(reason = %reason, "Connection handshake failed");
            }
            Self::Failed(reason) => tracing::error!(reason = %reason, "Session failed"),
        }
    }
}

/// Drive one upgraded connection from greeting to close.
pub async fn run_session<S>(mut ws: WebSocketStream<S>, ctx: &SessionContext) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let codec = JsonCodec::new();
    let mut session = Session::new(Arc::clone(&ctx.symbol));

    let result = handshake(&mut ws, &mut session, &codec, &ctx.shutdown).await;
    let state = session.state();

    let outcome = match result {
        Ok(()) => stream(&mut ws, &session, ctx).await,
        Err(SessionError::Protocol(violation)) => {
            close(&mut ws, CloseCode::Policy, ctx.close_timeout).await;
            SessionOutcome::ProtocolViolation { state, violation }
        }
        Err(SessionError::TransportDisconnect(reason)) => SessionOutcome::Disconnected {
            state,
            bars_sent: 0,
            reason,
        },
        Err(SessionError::Shutdown) => {
            close(&mut ws, CloseCode::Away, ctx.close_timeout).await;
            SessionOutcome::Shutdown {
                state,
                bars_sent: 0,
            }
        }
        Err(SessionError::Encode(e)) => SessionOutcome::Failed(e.to_string()),
    };

    session.close();
    outcome
}

async fn handshake<S>(
    ws: &mut WebSocketStream<S>,
    session: &mut Session,
    codec: &JsonCodec,
    shutdown: &CancellationToken,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_json(ws, codec, &SuccessMessage::connected()).await?;
    tracing::debug!(state = %session.state(), "Sent connected greeting");

    let text = next_text(ws, shutdown).await?;
    let auth = codec.decode_auth(&text).map_err(ProtocolViolation::from)?;
    session.authenticate(|key| auth.has_key(key))?;
    send_json(ws, codec, &SuccessMessage::authenticated()).await?;
    tracing::debug!(state = %session.state(), "Client authenticated");

    let text = next_text(ws, shutdown).await?;
    let request = codec
        .decode_subscribe(&text)
        .map_err(ProtocolViolation::from)?;
    session.subscribe(&request.action, &request.bars)?;
    send_json(ws, codec, &SubscriptionMessage::bars_only(session.symbol())).await?;
    tracing::info!(symbol = %session.symbol(), "Client subscribed");

    session.start_streaming()?;
    Ok(())
}

async fn stream<S>(
    ws: &mut WebSocketStream<S>,
    session: &Session,
    ctx: &SessionContext,
) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let streamer = BarStreamer::new(ctx.delay, &ctx.shutdown, &ctx.stats);
    tracing::info!(bars = ctx.bars.len(), delay = ?ctx.delay, "Streaming bars");

    match streamer.stream(ws, &ctx.bars).await {
        Ok(StreamOutcome::Completed { sent }) => {
            close(ws, CloseCode::Normal, ctx.close_timeout).await;
            SessionOutcome::Completed { bars_sent: sent }
        }
        Ok(StreamOutcome::Disconnected { sent, reason }) => SessionOutcome::Disconnected {
            state: session.state(),
            bars_sent: sent,
            reason,
        },
        Ok(StreamOutcome::Cancelled { sent }) => {
            close(ws, CloseCode::Away, ctx.close_timeout).await;
            SessionOutcome::Shutdown {
                state: session.state(),
                bars_sent: sent,
            }
        }
        Err(e) => SessionOutcome::Failed(e.to_string()),
    }
}

async fn send_json<S, T>(
    ws: &mut WebSocketStream<S>,
    codec: &JsonCodec,
    message: &T,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize + Sync,
{
    let text = codec.encode(message)?;
    ws.send(Message::text(text))
        .await
        .map_err(|e| SessionError::TransportDisconnect(e.to_string()))
}

/// Wait for the next text message. Ping and Pong are answered by the
/// transport and skipped here.
async fn next_text<S>(
    ws: &mut WebSocketStream<S>,
    shutdown: &CancellationToken,
) -> Result<String, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => return Err(SessionError::Shutdown),
            frame = ws.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Binary(_))) => return Err(ProtocolViolation::NonTextFrame.into()),
            Some(Ok(Message::Close(_))) => {
                return Err(SessionError::TransportDisconnect(
                    "client sent close".to_string(),
                ));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Err(e)) => return Err(SessionError::TransportDisconnect(e.to_string())),
            None => {
                return Err(SessionError::TransportDisconnect(
                    "connection closed".to_string(),
                ));
            }
        }
    }
}

/// Send a close frame and wait briefly for the peer's reply.
async fn close<S>(ws: &mut WebSocketStream<S>, code: CloseCode, timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(""),
    };
    if let Err(e) = ws.close(Some(frame)).await {
        tracing::debug!(error = %e, "Close frame not delivered");
        return;
    }

    let drained = tokio::time::timeout(timeout, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    if drained.is_err() {
        tracing::debug!(?timeout, "Peer did not answer close frame");
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;
    use crate::application::ports::BarSource;
    use crate::domain::streaming::Bar;
    use crate::infrastructure::bars::InMemoryBarSource;

    type Ws = WebSocketStream<DuplexStream>;

    async fn pair() -> (Ws, Ws) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    fn context(rows: usize) -> SessionContext {
        let mut source = InMemoryBarSource::default();
        for i in 0..rows {
            #[allow(clippy::cast_precision_loss)]
            let p = 100.0 + i as f64;
            source.push(Bar::minute("AAPL", p, p, p, p, 10.0, None, 1.0, p));
        }
        SessionContext {
            bars: source.load().unwrap(),
            symbol: Arc::from("AAPL"),
            delay: Duration::ZERO,
            close_timeout: Duration::from_millis(200),
            shutdown: CancellationToken::new(),
            stats: Arc::new(SessionStats::new()),
        }
    }

    async fn recv_text(client: &mut Ws) -> String {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    /// Read until the server's close frame and return its code.
    async fn recv_close(client: &mut Ws) -> Option<CloseCode> {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code),
                Some(Ok(Message::Text(text))) => panic!("unexpected text: {text}"),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return None,
            }
        }
    }

    async fn send(client: &mut Ws, text: &str) {
        client.send(Message::text(text.to_string())).await.unwrap();
    }

    async fn authenticate(client: &mut Ws) {
        assert_eq!(
            recv_text(client).await,
            r#"[{"T":"success","msg":"connected"}]"#
        );
        send(client, r#"{"action":"auth","key":"k","secret":"s"}"#).await;
        assert_eq!(
            recv_text(client).await,
            r#"[{"T":"success","msg":"authenticated"}]"#
        );
    }

    #[tokio::test]
    async fn full_handshake_then_bars_then_close() {
        let (server, mut client) = pair().await;
        let ctx = context(3);

        let client_task = tokio::spawn(async move {
            authenticate(&mut client).await;
            send(&mut client, r#"{"action":"subscribe","bars":["AAPL"]}"#).await;
            let confirmation = recv_text(&mut client).await;

            let mut bars = Vec::new();
            for _ in 0..3 {
                bars.push(recv_text(&mut client).await);
            }
            let code = recv_close(&mut client).await;
            (confirmation, bars, code)
        });

        let outcome = run_session(server, &ctx).await;
        assert_eq!(outcome, SessionOutcome::Completed { bars_sent: 3 });

        let (confirmation, bars, code) = client_task.await.unwrap();
        assert_eq!(
            confirmation,
            r#"[{"T":"subscription","bars":["AAPL"],"trades":[],"quotes":[],"updatedBars":[],"dailyBars":[],"statuses":[],"lulds":[],"corrections":[],"cancelErrors":[]}]"#
        );
        for (i, text) in bars.iter().enumerate() {
            let value: serde_json::Value = serde_json::from_str(text).unwrap();
            assert_eq!(value[0]["T"], "b");
            assert_eq!(value[0]["S"], "AAPL");
            #[allow(clippy::cast_precision_loss)]
            let expected = 100.0 + i as f64;
            assert_eq!(value[0]["o"], expected);
        }
        assert_eq!(code, Some(CloseCode::Normal));
    }

    #[tokio::test]
    async fn missing_auth_key_closes_without_response() {
        for auth in [
            r#"{"key":"k","secret":"s"}"#,
            r#"{"action":"auth","secret":"s"}"#,
            r#"{"action":"auth","key":"k"}"#,
        ] {
            let (server, mut client) = pair().await;
            let ctx = context(1);

            let client_task = tokio::spawn(async move {
                let _connected = recv_text(&mut client).await;
                send(&mut client, auth).await;
                recv_close(&mut client).await
            });

            let outcome = run_session(server, &ctx).await;
            assert!(matches!(
                outcome,
                SessionOutcome::ProtocolViolation {
                    state: SessionState::Connected,
                    violation: ProtocolViolation::MissingAuthKey(_),
                }
            ));
            assert_eq!(client_task.await.unwrap(), Some(CloseCode::Policy));
        }
    }

    #[tokio::test]
    async fn malformed_auth_is_a_violation() {
        let (server, mut client) = pair().await;
        let ctx = context(1);

        let client_task = tokio::spawn(async move {
            let _connected = recv_text(&mut client).await;
            send(&mut client, "not json").await;
            recv_close(&mut client).await
        });

        let outcome = run_session(server, &ctx).await;
        assert!(matches!(
            outcome,
            SessionOutcome::ProtocolViolation {
                violation: ProtocolViolation::Malformed(_),
                ..
            }
        ));
        assert_eq!(client_task.await.unwrap(), Some(CloseCode::Policy));
    }

    #[tokio::test]
    async fn binary_frame_is_a_violation() {
        let (server, mut client) = pair().await;
        let ctx = context(1);

        let client_task = tokio::spawn(async move {
            let _connected = recv_text(&mut client).await;
            client
                .send(Message::binary(b"{}".to_vec()))
                .await
                .unwrap();
            recv_close(&mut client).await
        });

        let outcome = run_session(server, &ctx).await;
        assert!(matches!(
            outcome,
            SessionOutcome::ProtocolViolation {
                violation: ProtocolViolation::NonTextFrame,
                ..
            }
        ));
        assert_eq!(client_task.await.unwrap(), Some(CloseCode::Policy));
    }

    #[tokio::test]
    async fn wrong_symbol_never_subscribes() {
        let (server, mut client) = pair().await;
        let ctx = context(2);

        let client_task = tokio::spawn(async move {
            authenticate(&mut client).await;
            send(&mut client, r#"{"action":"subscribe","bars":["MSFT"]}"#).await;
            recv_close(&mut client).await
        });

        let outcome = run_session(server, &ctx).await;
        assert!(matches!(
            outcome,
            SessionOutcome::ProtocolViolation {
                state: SessionState::Authenticated,
                violation: ProtocolViolation::SymbolNotRequested { .. },
            }
        ));
        assert_eq!(outcome.bars_sent(), 0);
        assert_eq!(client_task.await.unwrap(), Some(CloseCode::Policy));
        assert_eq!(ctx.stats.snapshot().bars_sent, 0);
    }

    #[tokio::test]
    async fn wrong_action_never_subscribes() {
        let (server, mut client) = pair().await;
        let ctx = context(2);

        let client_task = tokio::spawn(async move {
            authenticate(&mut client).await;
            send(&mut client, r#"{"action":"unsubscribe","bars":["AAPL"]}"#).await;
            recv_close(&mut client).await
        });

        let outcome = run_session(server, &ctx).await;
        assert!(matches!(
            outcome,
            SessionOutcome::ProtocolViolation {
                violation: ProtocolViolation::UnexpectedAction(_),
                ..
            }
        ));
        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn ping_during_handshake_is_skipped() {
        let (server, mut client) = pair().await;
        let ctx = context(1);

        let client_task = tokio::spawn(async move {
            let _connected = recv_text(&mut client).await;
            client.send(Message::Ping(b"hi".to_vec().into())).await.unwrap();
            send(&mut client, r#"{"action":"auth","key":"k","secret":"s"}"#).await;
            let authenticated = recv_text(&mut client).await;
            send(&mut client, r#"{"action":"subscribe","bars":["AAPL"]}"#).await;
            let _confirmation = recv_text(&mut client).await;
            let _bar = recv_text(&mut client).await;
            recv_close(&mut client).await;
            authenticated
        });

        let outcome = run_session(server, &ctx).await;
        assert_eq!(outcome, SessionOutcome::Completed { bars_sent: 1 });
        assert_eq!(
            client_task.await.unwrap(),
            r#"[{"T":"success","msg":"authenticated"}]"#
        );
    }

    #[tokio::test]
    async fn client_disconnect_during_handshake() {
        let (server, mut client) = pair().await;
        let ctx = context(1);

        let client_task = tokio::spawn(async move {
            let _connected = recv_text(&mut client).await;
            drop(client);
        });

        let outcome = run_session(server, &ctx).await;
        client_task.await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Disconnected {
                state: SessionState::Connected,
                bars_sent: 0,
                ..
            }
        ));
        assert_eq!(outcome.kind(), OutcomeKind::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_during_handshake_sends_going_away() {
        let (server, mut client) = pair().await;
        let ctx = context(1);
        ctx.shutdown.cancel();

        let client_task = tokio::spawn(async move {
            let _connected = recv_text(&mut client).await;
            recv_close(&mut client).await
        });

        let outcome = run_session(server, &ctx).await;
        assert!(matches!(outcome, SessionOutcome::Shutdown { .. }));
        assert_eq!(client_task.await.unwrap(), Some(CloseCode::Away));
    }

    #[tokio::test]
    async fn each_session_replays_from_the_first_bar() {
        let ctx = context(2);

        for _ in 0..2 {
            let (server, mut client) = pair().await;
            let client_task = tokio::spawn(async move {
                authenticate(&mut client).await;
                send(&mut client, r#"{"action":"subscribe","bars":["AAPL"]}"#).await;
                let _confirmation = recv_text(&mut client).await;
                let first = recv_text(&mut client).await;
                let _second = recv_text(&mut client).await;
                recv_close(&mut client).await;
                first
            });

            let outcome = run_session(server, &ctx).await;
            assert_eq!(outcome.bars_sent(), 2);
            let first: serde_json::Value =
                serde_json::from_str(&client_task.await.unwrap()).unwrap();
            assert_eq!(first[0]["o"], 100.0);
        }
        assert_eq!(ctx.stats.snapshot().bars_sent, 4);
    }
}
