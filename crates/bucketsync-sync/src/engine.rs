//! Sync coordinator
//!
//! Three entry points differ only in where candidate paths come from:
//!
//! - [`SyncCoordinator::sync_directory`] walks a local tree
//! - [`SyncCoordinator::sync_files`] takes an explicit list
//! - [`SyncCoordinator::sync_file_list`] reads one path per line from a file
//!
//! All of them feed the same pass: candidates are turned into [`SyncTask`]s
//! and submitted to a bounded [`WorkerPool`]. Each worker runs the per-file
//! pipeline:
//!
//! ```text
//! read file once -> (unless force) HEAD + compare -> PUT same bytes
//! ```
//!
//! A failed first attempt is counted as an error; if another attempt could
//! succeed it is also pushed onto the [`RetryQueue`]. After the main pass has
//! fully drained, the queue is retried once unless the failure ratio trips
//! the circuit breaker, in which case the pass ends with
//! [`SyncError::ExcessiveFailures`]. The ratio counts every first-attempt
//! failure, including local ones that are never retried.
//!
//! Every pass gets fresh counters and a fresh retry queue, so running the
//! same coordinator twice gives two independent summaries.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bucketsync_core::config::Config;
use bucketsync_core::domain::{parse_key_extras, DomainError, PutOptions, StatsSnapshot, SyncStats, SyncTask};
use bucketsync_core::ports::IObjectStore;

use crate::detector::{ChangeDetector, LocalFile};
use crate::enumerator::LocalEnumerator;
use crate::pool::{WaitGroup, WorkerPool};
use crate::rate_limit::RequestRateLimiter;
use crate::retry::{RetryPolicy, RetryQueue};
use crate::status::StatusReporter;
use crate::SyncError;

// ============================================================================
// Options and results
// ============================================================================

/// Settings for a [`SyncCoordinator`]
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Remote prefix joined in front of every relative path
    pub prefix: String,
    /// Default canned ACL for uploads
    pub acl: Option<String>,
    /// Upload without change detection
    pub force: bool,
    /// Detect changes but never PUT
    pub dry_run: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_retry_percent: f64,
    pub status_interval: Duration,
    /// Extension filter for directory walks
    pub extensions: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncOptions {
    /// Builds options from the `sync` configuration section
    pub fn from_config(config: &Config) -> Self {
        let sync = &config.sync;
        Self {
            prefix: sync.prefix.clone(),
            acl: Some(sync.acl.clone()).filter(|acl| !acl.is_empty()),
            force: sync.force,
            dry_run: sync.dry_run,
            workers: sync.workers,
            queue_capacity: sync.queue_capacity,
            max_retry_percent: sync.max_retry_percent,
            status_interval: Duration::from_secs(sync.status_interval_secs),
            extensions: sync.extensions.clone(),
        }
    }
}

/// One file to sync, with optional per-object overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub overrides: PutOptions,
}

impl From<PathBuf> for Candidate {
    fn from(path: PathBuf) -> Self {
        Self {
            path,
            overrides: PutOptions::default(),
        }
    }
}

impl Candidate {
    /// Parses `path[#ACL=..,ContentType=..]`, resolving relative paths
    /// against `root`
    ///
    /// # Errors
    /// [`DomainError::InvalidExtras`] for a malformed suffix,
    /// [`DomainError::InvalidPath`] for an empty path.
    pub fn parse(line: &str, root: &Path) -> Result<Self, DomainError> {
        let (path, overrides) = parse_key_extras(line.trim())?;
        if path.is_empty() {
            return Err(DomainError::InvalidPath(line.to_string()));
        }

        let path = PathBuf::from(path);
        let path = if path.is_relative() { root.join(path) } else { path };
        Ok(Self { path, overrides })
    }
}

/// Result of a sync pass
///
/// A cancelled pass still yields a summary; tasks that never started are
/// counted as scheduled but not completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSummary {
    pub stats: StatsSnapshot,
    pub elapsed: Duration,
    /// The cancellation token fired before the pass finished
    pub cancelled: bool,
}

// ============================================================================
// Per-pass state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    /// The retry; failures are terminal
    Final,
}

enum Outcome {
    Uploaded,
    Skipped,
}

/// State shared by every worker of one pass
struct Pass {
    store: Arc<dyn IObjectStore>,
    limiter: Arc<RequestRateLimiter>,
    detector: ChangeDetector,
    stats: Arc<SyncStats>,
    retries: RetryQueue,
    /// First-attempt failures, retryable or not
    failed: AtomicUsize,
    acl: Option<String>,
    force: bool,
    dry_run: bool,
    cancel: CancellationToken,
}

impl Pass {
    async fn run_task(&self, task: SyncTask, attempt: Attempt) {
        if self.cancel.is_cancelled() {
            debug!(key = task.key(), "Cancelled before start");
            return;
        }

        match self.upload(&task).await {
            Ok(Outcome::Uploaded) => self.stats.record_success(),
            Ok(Outcome::Skipped) => self.stats.record_skipped(),
            Err(SyncError::Cancelled) => {
                debug!(key = task.key(), "Cancelled");
            }
            Err(e) => {
                self.stats.record_error();
                if attempt == Attempt::First {
                    self.record_first_failure();
                }
                if attempt == Attempt::First && e.is_retryable() {
                    warn!(key = task.key(), error = %e, "Upload failed, queued for retry");
                    self.retries.push(task);
                } else {
                    error!(key = task.key(), path = %task.source().display(), error = %e, "Upload failed");
                }
            }
        }
    }

    fn record_first_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn first_failures(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    async fn upload(&self, task: &SyncTask) -> Result<Outcome, SyncError> {
        let key = task.key();
        let local = LocalFile::read(task.source()).await?;

        if !self.force {
            self.limiter.acquire(&self.cancel).await?;
            let verdict = self.detector.evaluate(key, &local).await?;
            if !verdict.needs_upload() {
                debug!(key, ?verdict, "Skipping");
                return Ok(Outcome::Skipped);
            }
        }

        let options = task.put_options(self.acl.as_deref());
        if self.dry_run {
            info!(key, size = local.body.len(), content_type = ?options.content_type, "Would upload");
            return Ok(Outcome::Uploaded);
        }

        self.limiter.acquire(&self.cancel).await?;
        self.store.put(key, local.body, &options).await?;
        debug!(key, "Uploaded");
        Ok(Outcome::Uploaded)
    }
}

// ============================================================================
// SyncCoordinator
// ============================================================================

/// Orchestrates enumeration, change detection, rate limiting, the worker
/// pool and retries
pub struct SyncCoordinator {
    store: Arc<dyn IObjectStore>,
    limiter: Arc<RequestRateLimiter>,
    options: SyncOptions,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("options", &self.options)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Creates a coordinator
    ///
    /// # Arguments
    /// * `store` - Object store all uploads go to
    /// * `limiter` - Admission control shared by all workers and retries
    /// * `options` - Pass settings
    /// * `cancel` - Token observed by every task before it starts
    pub fn new(
        store: Arc<dyn IObjectStore>,
        limiter: Arc<RequestRateLimiter>,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Self {
        let policy = RetryPolicy::new(options.max_retry_percent);
        Self {
            store,
            limiter,
            options,
            policy,
            cancel,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Syncs every file under `root`
    ///
    /// # Errors
    /// - [`SyncError::Io`] if `root` cannot be read
    /// - [`SyncError::ExcessiveFailures`] if the retry circuit breaker trips
    ///
    /// Cancellation is not an error: the summary has `cancelled` set.
    #[tracing::instrument(skip(self), fields(root = %root.display()))]
    pub async fn sync_directory(&self, root: &Path) -> Result<SyncSummary, SyncError> {
        let enumerator = LocalEnumerator::new(root).with_extensions(&self.options.extensions);
        let (tx, rx) = mpsc::channel::<Candidate>(self.channel_capacity());
        let cancel = self.cancel.clone();

        let producer = async move { enumerator.walk(tx, &cancel).await.map(|_| ()) };
        self.run_pass(root, rx, producer).await
    }

    /// Syncs an explicit list of paths
    ///
    /// Each entry may carry a `#ACL=..,ContentType=..` suffix. Relative paths
    /// are resolved against `root`.
    ///
    /// # Errors
    /// [`SyncError::Domain`] if an entry cannot be parsed; nothing is
    /// scheduled in that case. Otherwise as [`sync_directory`](Self::sync_directory).
    #[tracing::instrument(skip(self, paths), fields(root = %root.display()))]
    pub async fn sync_files<I, S>(&self, paths: I, root: &Path) -> Result<SyncSummary, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = paths
            .into_iter()
            .map(|p| Candidate::parse(p.as_ref(), root))
            .collect::<Result<Vec<_>, _>>()?;
        let (tx, rx) = mpsc::channel::<Candidate>(self.channel_capacity());

        let producer = async move {
            for candidate in candidates {
                if tx.send(candidate).await.is_err() {
                    break;
                }
            }
            Ok(())
        };
        self.run_pass(root, rx, producer).await
    }

    /// Syncs the paths listed in `list_file`, one per line
    ///
    /// Blank lines are ignored. Lines that cannot be parsed are logged and
    /// skipped.
    ///
    /// # Errors
    /// [`SyncError::Io`] if the list cannot be opened (before anything is
    /// scheduled) or read. Otherwise as [`sync_directory`](Self::sync_directory).
    #[tracing::instrument(skip(self), fields(list = %list_file.display(), root = %root.display()))]
    pub async fn sync_file_list(&self, list_file: &Path, root: &Path) -> Result<SyncSummary, SyncError> {
        let file = tokio::fs::File::open(list_file)
            .await
            .map_err(|e| SyncError::io(list_file, e))?;
        let (tx, rx) = mpsc::channel::<Candidate>(self.channel_capacity());
        let cancel = self.cancel.clone();
        let list_path = list_file.to_path_buf();
        let root_path = root.to_path_buf();

        let producer = async move {
            let mut lines = tokio::io::BufReader::new(file).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| SyncError::io(&list_path, e))?
            {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                if line.trim().is_empty() {
                    continue;
                }
                match Candidate::parse(&line, &root_path) {
                    Ok(candidate) => {
                        if tx.send(candidate).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(line = %line, error = %e, "Skipping unparseable list entry"),
                }
            }
            Ok(())
        };
        self.run_pass(root, rx, producer).await
    }

    fn channel_capacity(&self) -> usize {
        self.options.queue_capacity.max(1)
    }

    fn new_pass(&self) -> Arc<Pass> {
        Arc::new(Pass {
            store: Arc::clone(&self.store),
            limiter: Arc::clone(&self.limiter),
            detector: ChangeDetector::new(Arc::clone(&self.store)),
            stats: Arc::new(SyncStats::new()),
            retries: RetryQueue::new(),
            failed: AtomicUsize::new(0),
            acl: self.options.acl.clone(),
            force: self.options.force,
            dry_run: self.options.dry_run,
            cancel: self.cancel.clone(),
        })
    }

    fn new_pool(&self) -> WorkerPool {
        WorkerPool::new(self.options.workers, self.options.queue_capacity)
    }

    /// Runs the main pass, waits for it to drain, then handles retries
    async fn run_pass<P>(
        &self,
        root: &Path,
        rx: mpsc::Receiver<Candidate>,
        producer: P,
    ) -> Result<SyncSummary, SyncError>
    where
        P: Future<Output = Result<(), SyncError>>,
    {
        let started = Instant::now();
        let pass = self.new_pass();
        let reporter = StatusReporter::spawn(Arc::clone(&pass.stats), self.options.status_interval, &self.cancel);

        let pool = self.new_pool();
        let wg = WaitGroup::new();
        let (produced, scheduled) = tokio::join!(producer, self.schedule(&pass, &pool, &wg, root, rx));
        wg.wait().await;
        pool.close().await;

        let result = match produced.and(scheduled) {
            Ok(()) => self.process_retries(&pass).await,
            Err(e) => Err(e),
        };
        reporter.stop().await;

        let stats = pass.stats.snapshot();
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "{stats}");

        match result {
            Ok(true) | Err(SyncError::Cancelled) => {}
            Ok(false) => {
                // Nothing was retried, so `scheduled` is still the first-pass count
                return Err(SyncError::ExcessiveFailures {
                    percent: RetryPolicy::ratio(pass.first_failures(), stats.scheduled),
                    stats,
                });
            }
            Err(e) => return Err(e),
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!(not_started = stats.scheduled.saturating_sub(stats.completed), "Sync pass cancelled");
        }
        Ok(SyncSummary {
            stats,
            elapsed: started.elapsed(),
            cancelled,
        })
    }

    /// Turns candidates into tasks and submits them
    async fn schedule(
        &self,
        pass: &Arc<Pass>,
        pool: &WorkerPool,
        wg: &WaitGroup,
        root: &Path,
        mut rx: mpsc::Receiver<Candidate>,
    ) -> Result<(), SyncError> {
        while let Some(candidate) = rx.recv().await {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let task = match SyncTask::new(&candidate.path, root, &self.options.prefix) {
                Ok(task) => task.with_overrides(&candidate.overrides),
                Err(e) => {
                    warn!(path = %candidate.path.display(), error = %e, "Cannot derive destination key");
                    pass.stats.record_scheduled();
                    pass.stats.record_error();
                    pass.record_first_failure();
                    continue;
                }
            };

            Self::submit(pass, pool, wg, task, Attempt::First).await?;
        }
        Ok(())
    }

    async fn submit(
        pass: &Arc<Pass>,
        pool: &WorkerPool,
        wg: &WaitGroup,
        task: SyncTask,
        attempt: Attempt,
    ) -> Result<(), SyncError> {
        pass.stats.record_scheduled();
        let guard = wg.add();
        let pass = Arc::clone(pass);
        pool.submit(async move {
            let _guard = guard;
            pass.run_task(task, attempt).await;
        })
        .await
    }

    /// Retries every queued task once, unless too many tasks failed
    ///
    /// The ratio is taken over all first-attempt failures, so local errors
    /// that are never queued still count toward the limit.
    ///
    /// # Returns
    /// `false` if the failure ratio exceeded the limit and nothing was retried
    async fn process_retries(&self, pass: &Arc<Pass>) -> Result<bool, SyncError> {
        let failed = pass.first_failures();
        if failed == 0 {
            return Ok(true);
        }

        let percent = RetryPolicy::ratio(failed, pass.stats.scheduled());
        if !self.policy.allows(percent) {
            error!(
                failed,
                percent,
                max_percent = self.policy.max_retry_percent,
                "E_EXCESSIVE_ERRORS: too many failures, not retrying"
            );
            return Ok(false);
        }

        if pass.retries.is_empty() {
            debug!(failed, "No failure is worth retrying");
            return Ok(true);
        }

        info!(failed, queued = pass.retries.len(), percent, "Retrying failed tasks");
        let pool = self.new_pool();
        let wg = WaitGroup::new();
        let mut result = Ok(true);

        while let Some(task) = pass.retries.pop() {
            if self.cancel.is_cancelled() {
                result = Err(SyncError::Cancelled);
                break;
            }
            pass.stats.record_retried();
            if let Err(e) = Self::submit(pass, &pool, &wg, task, Attempt::Final).await {
                result = Err(e);
                break;
            }
        }

        wg.wait().await;
        pool.close().await;
        result
    }
}
