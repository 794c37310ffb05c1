//! Replay Server
//!
//! Accepts TLS connections on the loopback listener, upgrades each one to a
//! WebSocket and runs an independent session task per connection.
//!
//! # Shutdown
//!
//! Cancelling the server's token stops the accept loop. Running sessions
//! see the same token, send a `1001 going away` close frame and finish;
//! [`ReplayServer::run`] waits for them up to the configured shutdown
//! timeout.

mod session;
mod stats;
mod streamer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

pub use self::session::{SessionContext, SessionError, SessionOutcome, run_session};
pub use self::stats::{SessionStats, StatsSnapshot};
pub use self::streamer::{BarStreamer, StreamOutcome};

use crate::domain::session::SessionState;
use crate::domain::streaming::BarSeries;
use crate::infrastructure::config::ServerSettings;
use crate::infrastructure::metrics;

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// No bars to derive the tracked symbol from.
    #[error("bar series is empty")]
    EmptySeries,

    /// Local address lookup failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// The TLS WebSocket replay server.
pub struct ReplayServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    context: Arc<SessionContext>,
    tracker: TaskTracker,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for ReplayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayServer")
            .field("listener", &self.listener.local_addr().ok())
            .field("symbol", &self.context.symbol)
            .field("bars", &self.context.bars.len())
            .finish_non_exhaustive()
    }
}

impl ReplayServer {
    /// Bind the listener. Nothing is accepted until [`Self::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if `bars` is empty or the address cannot be bound.
    pub async fn bind(
        settings: &ServerSettings,
        acceptor: TlsAcceptor,
        bars: BarSeries,
        stats: Arc<SessionStats>,
        shutdown: CancellationToken,
    ) -> Result<Self, ServerError> {
        let symbol: Arc<str> = Arc::from(bars.symbol().ok_or(ServerError::EmptySeries)?);

        let listener = TcpListener::bind(settings.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: settings.listen_addr,
                source,
            })?;

        Ok(Self {
            listener,
            acceptor,
            context: Arc::new(SessionContext {
                bars,
                symbol,
                delay: settings.delay,
                close_timeout: settings.close_timeout,
                shutdown,
                stats,
            }),
            tracker: TaskTracker::new(),
            shutdown_timeout: settings.shutdown_timeout,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown token is cancelled, then wait
    /// for in-flight sessions.
    ///
    /// # Errors
    ///
    /// Accept failures are logged and retried, so this currently always
    /// returns `Ok`.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            acceptor,
            context,
            tracker,
            shutdown_timeout,
        } = self;

        tracing::info!(
            addr = %listener.local_addr()?,
            symbol = %context.symbol,
            bars = context.bars.len(),
            "Listening for wss:// connections"
        );

        loop {
            tokio::select! {
                () = context.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session_id = Uuid::new_v4();
                        let span = tracing::info_span!("session", %session_id, %peer);
                        tracker.spawn(
                            handle_connection(stream, acceptor.clone(), Arc::clone(&context))
                                .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, retry_in = ?ACCEPT_RETRY_DELAY, "Accept failed");
                        if !accept_backoff(&context.shutdown).await {
                            break;
                        }
                    }
                },
            }
        }

        drop(listener);
        tracker.close();
        tracing::info!(active = tracker.len(), "Stopped accepting, draining sessions");

        if tokio::time::timeout(shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = tracker.len(),
                timeout = ?shutdown_timeout,
                "Sessions still running at shutdown timeout"
            );
        } else {
            tracing::info!("All sessions finished");
        }

        Ok(())
    }
}

/// Wait before retrying a failed accept. Returns `false` if shutdown began
/// in the meantime.
async fn accept_backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

/// TLS handshake, WebSocket upgrade, then the session itself.
async fn handle_connection(stream: TcpStream, acceptor: TlsAcceptor, ctx: Arc<SessionContext>) {
    let started = Instant::now();
    ctx.stats.session_started();
    tracing::info!("Client connected");

    let upgraded = tokio::select! {
        () = ctx.shutdown.cancelled() => Err(None),
        result = upgrade(stream, &acceptor) => result.map_err(Some),
    };

    let outcome = match upgraded {
        Ok(ws) => run_session(ws, &ctx).await,
        Err(Some(reason)) => SessionOutcome::HandshakeFailed(reason),
        Err(None) => SessionOutcome::Shutdown {
            state: SessionState::Connected,
            bars_sent: 0,
        },
    };

    outcome.log();
    ctx.stats.session_finished(outcome.kind());
    metrics::record_session_finished(outcome.kind(), started.elapsed());
}

async fn upgrade(
    stream: TcpStream,
    acceptor: &TlsAcceptor,
) -> Result<WebSocketStream<TlsStream<TcpStream>>, String> {
    let tls = acceptor
        .accept(stream)
        .await
        .map_err(|e| format!("TLS handshake failed: {e}"))?;
    tokio_tungstenite::accept_async(tls)
        .await
        .map_err(|e| format!("WebSocket upgrade failed: {e}"))
}
