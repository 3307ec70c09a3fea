//! Bucketsync Sync - Concurrent sync and delete engine
//!
//! Provides:
//! - Change detection against remote metadata
//! - GCRA admission control shared by every worker
//! - A bounded worker pool with an explicit completion barrier
//! - One-shot retries guarded by a failure-ratio circuit breaker
//! - Paginated listing with per-page fan-out and recursive delete
//!
//! ## Modules
//!
//! - [`detector`] - Decides whether a remote copy is stale
//! - [`rate_limit`] - Request admission with bounded backoff
//! - [`pool`] - Worker pool and wait group
//! - [`retry`] - Retry queue and circuit breaker
//! - [`engine`] - Sync coordinator and per-file pipeline
//! - [`enumerator`] - Local tree walk
//! - [`status`] - Periodic progress reporter
//! - [`lister`] - Listing, recursive delete and bulk delete
//! - [`invoke`] - Bounded remote invocation fan-out

pub mod detector;
pub mod engine;
pub mod enumerator;
pub mod invoke;
pub mod lister;
pub mod pool;
pub mod rate_limit;
pub mod retry;
pub mod status;

#[cfg(test)]
mod test_support;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use bucketsync_core::domain::{DomainError, StatsSnapshot, StoreError};

pub use engine::{Candidate, SyncCoordinator, SyncOptions, SyncSummary};
pub use invoke::{InvokeFanout, InvokeReport};
pub use lister::{ListOptions, ListReport, Lister};
pub use rate_limit::RequestRateLimiter;

/// Errors that can occur during sync and delete operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The object store rejected or failed a request
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A local file could not be read
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The rate limiter denied every attempt
    #[error("Rate limits exceeded max tries ({attempts})")]
    RateLimitExceeded { attempts: u32 },

    /// Work was submitted after the pool was closed
    #[error("Worker pool is closed")]
    PoolClosed,

    /// Work was offered to a full pool without waiting
    #[error("Worker pool is saturated")]
    PoolSaturated,

    /// The operation observed the cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Too many tasks failed for retries to be worthwhile
    #[error("E_EXCESSIVE_ERRORS: {percent:.2}% of scheduled tasks failed ({stats})")]
    ExcessiveFailures { percent: f64, stats: StatsSnapshot },

    /// A listing callback failed
    #[error("Callback failed for {key}: {message}")]
    Callback { key: String, message: String },

    /// A domain-level error propagated from bucketsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Wraps an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if a failed upload with this error should be retried
    ///
    /// Transient store errors (see [`StoreError::is_transient`]) and rate
    /// limit exhaustion are retried. Rejected credentials, malformed requests
    /// and local files that are missing, unreadable, corrupt or not regular
    /// files are not, since another attempt would fail the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::RateLimitExceeded { .. } => true,
            Self::Io { source, .. } => !matches!(
                source.kind(),
                io::ErrorKind::NotFound
                    | io::ErrorKind::PermissionDenied
                    | io::ErrorKind::InvalidData
                    | io::ErrorKind::InvalidInput
            ),
            _ => false,
        }
    }
}
