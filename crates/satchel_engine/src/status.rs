//! Sync status reporting.

use std::time::{Duration, Instant};

/// A point-in-time view of sync health.
///
/// Writes never fail for sync reasons, so this query is how callers
/// observe delivery lag: the size and age of the outbox, dead letters,
/// and the last drain.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Live intents awaiting delivery.
    pub pending_intents: usize,
    /// Intents dead-lettered after exhausting their retry budget.
    pub dead_letters: usize,
    /// Age of the oldest live intent.
    pub oldest_pending_age: Option<Duration>,
    /// When the last drain completed.
    pub last_drain_at: Option<Instant>,
    /// Drains completed since the engine was created.
    pub drains_completed: u64,
    /// Intents delivered since the engine was created.
    pub intents_delivered: u64,
    /// Most recent delivery or refresh error, if the last run was not
    /// clean.
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Returns true if nothing is waiting on the remote.
    pub fn is_settled(&self) -> bool {
        self.pending_intents == 0
    }
}

/// Internal counters the engine accumulates across runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct EngineStats {
    pub(crate) drains_completed: u64,
    pub(crate) intents_delivered: u64,
    pub(crate) last_drain_at: Option<Instant>,
    pub(crate) last_error: Option<String>,
}
