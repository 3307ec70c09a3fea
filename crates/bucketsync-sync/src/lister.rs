//! Paginated listing, recursive delete and bulk delete
//!
//! [`Lister::list`] walks the pages of a LIST in order. For each page it
//! spawns one task per object to run the caller's callback and joins all of
//! them before requesting the next page, so pages are strictly sequential
//! while objects within a page run concurrently.
//!
//! Every page gets a child of the lister's cancellation token. Tasks check
//! it before starting and discard their result if it fired while they ran.
//! In strict mode the first callback failure cancels the page and is
//! returned; otherwise failures are logged and counted. A panicking callback
//! is reported as [`SyncError::Callback`] for the key it was handling.
//!
//! With timings enabled a progress line is logged every ten seconds, also
//! while a slow page is still draining.
//!
//! [`Lister::delete_recursive`] builds on `list`: every key under `path/`
//! other than `path` itself is deleted recursively, then `path` is deleted.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bucketsync_core::config::ListingConfig;
use bucketsync_core::domain::ObjectEntry;
use bucketsync_core::ports::IObjectStore;

use crate::rate_limit::RequestRateLimiter;
use crate::SyncError;

/// Interval between progress lines when timings are enabled
const TIMINGS_INTERVAL: Duration = Duration::from_secs(10);

/// Listing behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Entries requested per page
    pub max_keys: usize,
    /// Abort on the first callback failure
    pub strict: bool,
    /// Log progress and total time
    pub timings: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::from(&ListingConfig::default())
    }
}

impl From<&ListingConfig> for ListOptions {
    fn from(config: &ListingConfig) -> Self {
        Self {
            max_keys: config.max_keys,
            strict: config.strict,
            timings: config.timings,
        }
    }
}

/// Counts from one listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListReport {
    pub pages: u64,
    pub items: u64,
    /// Callbacks that failed (non-strict mode only)
    pub failed: u64,
}

/// Lists and deletes objects under a prefix
#[derive(Clone)]
pub struct Lister {
    store: Arc<dyn IObjectStore>,
    limiter: Arc<RequestRateLimiter>,
    options: ListOptions,
    dry_run: bool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Lister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lister")
            .field("options", &self.options)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Lister {
    pub fn new(
        store: Arc<dyn IObjectStore>,
        limiter: Arc<RequestRateLimiter>,
        options: ListOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            limiter,
            options,
            dry_run: false,
            cancel,
        }
    }

    /// Logs deletes instead of performing them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    /// Runs `callback` for every object whose key starts with `prefix`
    ///
    /// # Errors
    /// - The LIST error, if a page cannot be fetched
    /// - The first callback error, in strict mode
    /// - [`SyncError::Cancelled`] if the token fired
    pub async fn list<F, Fut>(&self, prefix: &str, callback: F) -> Result<ListReport, SyncError>
    where
        F: Fn(ObjectEntry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let callback = Arc::new(callback);
        let started = Instant::now();
        let mut progress = tokio::time::interval_at(started + TIMINGS_INTERVAL, TIMINGS_INTERVAL);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = ListReport::default();
        let mut continuation: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            self.limiter.acquire(&self.cancel).await?;
            let page = self
                .store
                .list_page(prefix, continuation.as_deref(), self.options.max_keys)
                .await?;
            report.pages += 1;

            let page_token = self.cancel.child_token();
            let mut tasks = JoinSet::new();
            for entry in page.entries {
                report.items += 1;
                let callback = Arc::clone(&callback);
                let token = page_token.clone();
                tasks.spawn(async move {
                    let key = entry.key.clone();
                    if token.is_cancelled() {
                        return (key, Err(SyncError::Cancelled));
                    }
                    let result = guarded(&key, async move { callback(entry).await }).await;
                    if token.is_cancelled() {
                        return (key, Err(SyncError::Cancelled));
                    }
                    (key, result)
                });
            }

            loop {
                let joined = tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = progress.tick(), if self.options.timings => {
                        info!(
                            prefix,
                            pages = report.pages,
                            items = report.items,
                            pending = tasks.len(),
                            "Listing progress"
                        );
                        continue;
                    }
                };
                let Some(joined) = joined else { break };
                // Panics are caught inside the task, so only an abort lands here
                let Ok((key, result)) = joined else { continue };

                match result {
                    Ok(()) | Err(SyncError::Cancelled) => {}
                    Err(e) if self.options.strict => {
                        page_token.cancel();
                        tasks.detach_all();
                        warn!(prefix, key = %key, error = %e, "Callback failed, aborting listing");
                        return Err(e);
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(prefix, key = %key, error = %e, "Callback failed");
                    }
                }
            }

            continuation = page.next_continuation;
            if continuation.is_none() {
                break;
            }
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        if self.options.timings {
            info!(
                prefix,
                pages = report.pages,
                items = report.items,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Listing finished"
            );
        }
        Ok(report)
    }

    /// Deletes `path` and every key below `path/`
    ///
    /// Children are removed before `path` itself. A key equal to `path` in
    /// the listing is not expanded again.
    pub fn delete_recursive(&self, path: &str) -> BoxFuture<'static, Result<(), SyncError>> {
        let lister = self.clone();
        let path = path.to_string();

        async move {
            if lister.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if lister.dry_run {
                info!(path = %path, "Would delete recursively");
                return Ok(());
            }

            let prefix = format!("{}/", path.trim_end_matches('/'));
            // Nested deletes still running after a strict failure observe this
            let scope = lister.cancel.child_token();
            let child_lister = Lister {
                cancel: scope.clone(),
                ..lister.clone()
            };
            let parent = path.clone();
            let listed = lister
                .list(&prefix, move |entry| {
                    let lister = child_lister.clone();
                    let parent = parent.clone();
                    async move {
                        if entry.key == parent {
                            return Ok(());
                        }
                        lister.delete_recursive(&entry.key).await
                    }
                })
                .await;
            if listed.is_err() {
                scope.cancel();
            }
            listed?;

            lister.delete_object(&path).await
        }
        .boxed()
    }

    /// Deletes a single key
    ///
    /// Deleting a key that does not exist succeeds.
    pub async fn delete_object(&self, key: &str) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if self.dry_run {
            info!(key, "Would delete");
            return Ok(());
        }

        self.limiter.acquire(&self.cancel).await?;
        self.store.delete(key).await?;
        debug!(key, "Deleted");
        Ok(())
    }

    /// Deletes each of `keys` that currently exists, concurrently
    ///
    /// # Returns
    /// Number of keys found and deleted
    ///
    /// # Errors
    /// The first HEAD or DELETE failure; remaining work is abandoned.
    pub async fn delete_keys_if_exists(&self, keys: Vec<String>) -> Result<usize, SyncError> {
        let token = self.cancel.child_token();
        let mut tasks = JoinSet::new();

        for key in keys {
            let lister = Lister {
                cancel: token.clone(),
                ..self.clone()
            };
            tasks.spawn(async move {
                guarded(&key, async {
                    if lister.cancel.is_cancelled() {
                        return Err(SyncError::Cancelled);
                    }
                    lister.limiter.acquire(&lister.cancel).await?;
                    if lister.store.head(&key).await?.is_none() {
                        debug!(key = %key, "Not present, nothing to delete");
                        return Ok(false);
                    }
                    lister.delete_object(&key).await.map(|()| true)
                })
                .await
            });
        }

        let mut deleted = 0;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or(Err(SyncError::Cancelled));

            match result {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    token.cancel();
                    tasks.detach_all();
                    return Err(e);
                }
            }
        }
        Ok(deleted)
    }
}

/// Awaits `work`, reporting a panic as a callback failure for `key`
async fn guarded<T, Fut>(key: &str, work: Fut) -> Result<T, SyncError>
where
    Fut: Future<Output = Result<T, SyncError>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(SyncError::Callback {
            key: key.to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}
