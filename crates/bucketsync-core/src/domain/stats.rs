//! Sync counters
//!
//! [`SyncStats`] is owned by one coordinator and shared with its workers
//! behind an `Arc`. Every mutation is a single atomic increment. Recording an
//! outcome bumps `completed` together with the outcome counter, so once no
//! task is in flight `completed == success + error + skipped`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for one coordinator
#[derive(Debug, Default)]
pub struct SyncStats {
    scheduled: AtomicU64,
    completed: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
}

impl SyncStats {
    /// Creates zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A task was handed to the worker pool
    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// A task uploaded (or would have, in dry run)
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A task failed
    pub fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A task found the remote copy up to date
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A failed task was resubmitted
    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of tasks scheduled so far
    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Reads all counters
    ///
    /// Each counter is read atomically; the set as a whole is only consistent
    /// when no task is in flight.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub scheduled: u64,
    pub completed: u64,
    pub success: u64,
    pub error: u64,
    pub skipped: u64,
    pub retried: u64,
}

impl StatsSnapshot {
    /// Returns true if `completed` equals the sum of the outcome counters
    pub fn is_balanced(&self) -> bool {
        self.completed == self.success + self.error + self.skipped
    }

    /// Counter growth since `earlier`
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            scheduled: self.scheduled.saturating_sub(earlier.scheduled),
            completed: self.completed.saturating_sub(earlier.completed),
            success: self.success.saturating_sub(earlier.success),
            error: self.error.saturating_sub(earlier.error),
            skipped: self.skipped.saturating_sub(earlier.skipped),
            retried: self.retried.saturating_sub(earlier.retried),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scheduled {} Completed {} Success {} Error {} Skipped {} Retried {}",
            self.scheduled, self.completed, self.success, self.error, self.skipped, self.retried
        )
    }
}
