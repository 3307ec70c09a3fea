//! Request admission control
//!
//! A single [`RequestRateLimiter`] is shared by every worker of a sync pass
//! and by the lister. It wraps a direct (unkeyed) GCRA limiter from
//! `governor`: the quota is `requests_per_minute` with a burst allowance of a
//! tenth of that.
//!
//! When a cell is not available the caller sleeps with a growing backoff and
//! tries again. After `max_attempts` denials it gives up with
//! [`SyncError::RateLimitExceeded`] instead of blocking forever.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bucketsync_sync::rate_limit::{RateLimitSettings, RequestRateLimiter};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), bucketsync_sync::SyncError> {
//! let limiter = RequestRateLimiter::new(RateLimitSettings::default());
//! limiter.acquire(&CancellationToken::new()).await?;
//! // ... issue one request ...
//! # Ok(())
//! # }
//! ```

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use bucketsync_core::config::RateLimitingConfig;

use crate::SyncError;

// ============================================================================
// RateLimitSettings
// ============================================================================

/// Tuning for [`RequestRateLimiter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Growth of the backoff per denial, in percent
    pub growth_percent: u32,
    pub max_backoff: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self::from(&RateLimitingConfig::default())
    }
}

impl From<&RateLimitingConfig> for RateLimitSettings {
    fn from(config: &RateLimitingConfig) -> Self {
        Self {
            requests_per_minute: config.requests_per_minute,
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            growth_percent: config.backoff_growth_percent,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RateLimitSettings {
    /// Burst allowance: a tenth of the per-minute quota, at least one
    pub fn burst(&self) -> u32 {
        (self.requests_per_minute / 10).max(1)
    }

    /// Backoff to use after a denial that slept for `current`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let grown = current + current * self.growth_percent / 100;
        // Tiny backoffs would otherwise never grow
        let grown = if grown == current {
            current + Duration::from_millis(1)
        } else {
            grown
        };
        grown.min(self.max_backoff)
    }
}

// ============================================================================
// RequestRateLimiter
// ============================================================================

/// Shared GCRA limiter with bounded backoff
pub struct RequestRateLimiter {
    limiter: DefaultDirectRateLimiter,
    settings: RateLimitSettings,
    /// Total denials observed, across all callers
    denied: AtomicU64,
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("settings", &self.settings)
            .field("denied", &self.denied_count())
            .finish_non_exhaustive()
    }
}

impl RequestRateLimiter {
    /// Creates a limiter from explicit settings
    pub fn new(settings: RateLimitSettings) -> Self {
        let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst()).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        debug!(
            requests_per_minute = per_minute.get(),
            burst = burst.get(),
            max_attempts = settings.max_attempts,
            "Rate limiter configured"
        );

        Self {
            limiter: RateLimiter::direct(quota),
            settings,
            denied: AtomicU64::new(0),
        }
    }

    /// Creates a limiter from the `rate_limiting` configuration section
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::new(RateLimitSettings::from(config))
    }

    /// Returns the limiter settings
    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Number of denied attempts so far
    pub fn denied_count(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    /// Waits until one request may proceed
    ///
    /// # Errors
    /// - [`SyncError::RateLimitExceeded`] after `max_attempts` denials
    /// - [`SyncError::Cancelled`] if `cancel` fires while backing off
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut backoff = self.settings.initial_backoff;

        for attempt in 1..=max_attempts {
            if self.limiter.check().is_ok() {
                if attempt > 1 {
                    trace!(attempt, "Admitted after backoff");
                }
                return Ok(());
            }

            self.denied.fetch_add(1, Ordering::Relaxed);
            if attempt == max_attempts {
                break;
            }

            trace!(attempt, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = self.settings.next_backoff(backoff);
        }

        warn!(attempts = max_attempts, "Rate limits exceeded max tries");
        Err(SyncError::RateLimitExceeded {
            attempts: max_attempts,
        })
    }
}
