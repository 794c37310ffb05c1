//! Bar Streamer
//!
//! Pushes the loaded bar sequence to one subscribed client, pausing for the
//! configured delay after every bar. While paused it keeps reading the
//! inbound side so a client that closes or drops is noticed immediately.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::stats::SessionStats;
use crate::domain::streaming::BarSeries;
use crate::infrastructure::alpaca::{CodecError, JsonCodec};

/// How a replay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every bar was sent.
    Completed {
        /// Bars sent.
        sent: usize,
    },
    /// The client went away mid-sequence.
    Disconnected {
        /// Bars sent before the disconnect.
        sent: usize,
        /// What the transport reported.
        reason: String,
    },
    /// Server shutdown interrupted the replay.
    Cancelled {
        /// Bars sent before cancellation.
        sent: usize,
    },
}

impl StreamOutcome {
    /// Bars sent, whatever the outcome.
    #[must_use]
    pub const fn sent(&self) -> usize {
        match self {
            Self::Completed { sent } | Self::Disconnected { sent, .. } | Self::Cancelled { sent } => {
                *sent
            }
        }
    }
}

enum Pause {
    Elapsed,
    Disconnected(String),
    Cancelled,
}

/// Paced replay of a [`BarSeries`] over one WebSocket.
#[derive(Debug)]
pub struct BarStreamer<'a> {
    codec: JsonCodec,
    delay: Duration,
    shutdown: &'a CancellationToken,
    stats: &'a SessionStats,
}

impl<'a> BarStreamer<'a> {
    /// Streamer pausing `delay` after each bar.
    #[must_use]
    pub const fn new(
        delay: Duration,
        shutdown: &'a CancellationToken,
        stats: &'a SessionStats,
    ) -> Self {
        Self {
            codec: JsonCodec::new(),
            delay,
            shutdown,
            stats,
        }
    }

    /// Send every bar in order, one single-element array per message.
    ///
    /// Always starts from the first bar. Transport failures end the replay
    /// with [`StreamOutcome::Disconnected`] rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if a bar cannot be encoded.
    pub async fn stream<S>(
        &self,
        ws: &mut WebSocketStream<S>,
        bars: &BarSeries,
    ) -> Result<StreamOutcome, CodecError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut sent = 0;

        for bar in bars {
            if self.shutdown.is_cancelled() {
                return Ok(StreamOutcome::Cancelled { sent });
            }

            let text = self.codec.encode(bar)?;
            if let Err(e) = ws.send(Message::text(text)).await {
                return Ok(StreamOutcome::Disconnected {
                    sent,
                    reason: e.to_string(),
                });
            }
            sent += 1;
            self.stats.bar_sent();
            tracing::trace!(sent, timestamp = ?bar.timestamp, "Sent bar");

            match self.pause(ws).await {
                Pause::Elapsed => {}
                Pause::Disconnected(reason) => {
                    return Ok(StreamOutcome::Disconnected { sent, reason });
                }
                Pause::Cancelled => return Ok(StreamOutcome::Cancelled { sent }),
            }
        }

        Ok(StreamOutcome::Completed { sent })
    }

    async fn pause<S>(&self, ws: &mut WebSocketStream<S>) -> Pause
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let sleep = tokio::time::sleep(self.delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Pause::Cancelled,
                () = &mut sleep => return Pause::Elapsed,
                frame = ws.next() => match frame {
                    None => return Pause::Disconnected("connection closed".to_string()),
                    Some(Err(e)) => return Pause::Disconnected(e.to_string()),
                    Some(Ok(Message::Close(_))) => {
                        return Pause::Disconnected("client sent close".to_string());
                    }
                    // Client chatter after subscribing is ignored.
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}
