//! Session counters shared between session tasks and the health server.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use crate::infrastructure::metrics::{self, OutcomeKind};

/// Lock-free session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    active: AtomicUsize,
    total: AtomicU64,
    completed: AtomicU64,
    bars_sent: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Sessions currently running.
    pub active_sessions: usize,
    /// Sessions accepted since startup.
    pub total_sessions: u64,
    /// Sessions that received every bar.
    pub completed_sessions: u64,
    /// Bar messages sent across all sessions.
    pub bars_sent: u64,
}

impl SessionStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection was accepted.
    pub fn session_started(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_session_accepted();
        metrics::set_active_sessions(active);
    }

    /// A session ended.
    pub fn session_finished(&self, outcome: OutcomeKind) {
        if outcome == OutcomeKind::Completed {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
        let active = self
            .active
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        metrics::set_active_sessions(active);
    }

    /// One bar message went out.
    pub fn bar_sent(&self) {
        self.bars_sent.fetch_add(1, Ordering::Relaxed);
        metrics::record_bar_sent();
    }

    /// Sessions currently running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Copy all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_sessions: self.active.load(Ordering::Relaxed),
            total_sessions: self.total.load(Ordering::Relaxed),
            completed_sessions: self.completed.load(Ordering::Relaxed),
            bars_sent: self.bars_sent.load(Ordering::Relaxed),
        }
    }
}
