//! Retry queue and failure-ratio circuit breaker
//!
//! Workers push tasks whose first attempt failed onto a [`RetryQueue`]. Once
//! the main pass has drained, [`RetryPolicy::allows`] decides whether the
//! failures look flaky enough to retry or whether the remote side is likely
//! down and retrying is pointless.

use std::sync::Mutex;

use bucketsync_core::domain::SyncTask;

/// Mutex-guarded LIFO stack of failed tasks
#[derive(Debug, Default)]
pub struct RetryQueue {
    tasks: Mutex<Vec<SyncTask>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SyncTask>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, task: SyncTask) {
        self.lock().push(task);
    }

    /// Removes the most recently pushed task
    pub fn pop(&self) -> Option<SyncTask> {
        self.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Threshold above which a pass gives up on retries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Largest tolerated `failed / scheduled` ratio, in percent
    pub max_retry_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_percent: 25.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retry_percent: f64) -> Self {
        Self { max_retry_percent }
    }

    /// Failure ratio in percent; zero when nothing was scheduled
    pub fn ratio(failed: usize, scheduled: u64) -> f64 {
        if scheduled == 0 {
            return 0.0;
        }
        failed as f64 / scheduled as f64 * 100.0
    }

    /// Returns true if a ratio of `percent` still warrants retrying
    pub fn allows(&self, percent: f64) -> bool {
        percent <= self.max_retry_percent
    }
}
