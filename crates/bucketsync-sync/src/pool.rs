//! Bounded worker pool and completion barrier
//!
//! [`WorkerPool`] runs a fixed number of long-lived tokio tasks that drain a
//! bounded FIFO queue of jobs. Submission waits when the queue is full;
//! [`WorkerPool::try_submit`] fails instead. The pool does not track which
//! job is which: callers that need to wait for a batch pair it with a
//! [`WaitGroup`], whose guard is moved into each job and released when the
//! job finishes, whether it succeeded, failed or panicked.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::SyncError;

/// A unit of work
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ============================================================================
// WaitGroup
// ============================================================================

/// Counts outstanding jobs and wakes waiters when the count reaches zero
#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Debug, Default)]
struct WaitGroupInner {
    count: AtomicUsize,
    notify: Notify,
}

/// Releases one unit of a [`WaitGroup`] when dropped
#[derive(Debug)]
#[must_use = "the wait group is released as soon as the guard is dropped"]
pub struct WaitGuard {
    inner: Arc<WaitGroupInner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one outstanding unit of work
    pub fn add(&self) -> WaitGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        WaitGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of units not yet released
    pub fn outstanding(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Waits until every guard handed out so far has been dropped
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

// ============================================================================
// WorkerPool
// ============================================================================

/// Fixed-size pool of workers draining a bounded queue
#[derive(Debug)]
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `workers` workers sharing a queue of `capacity` jobs
    ///
    /// Both values are raised to at least one. Must be called from within a
    /// tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let size = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..size)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        // The lock is released before the job runs
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };

                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            error!(worker_id, "Job panicked");
                        }
                    }
                    debug!(worker_id, "Worker stopped");
                })
            })
            .collect();

        debug!(workers = size, capacity = capacity.max(1), "Worker pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            size,
        }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>, SyncError> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(SyncError::PoolClosed)
    }

    /// Queues `work`, waiting while the queue is full
    ///
    /// Returns once the job is queued, not when it has run.
    ///
    /// # Errors
    /// [`SyncError::PoolClosed`] if [`close`](Self::close) has been called.
    pub async fn submit<F>(&self, work: F) -> Result<(), SyncError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender()?
            .send(Box::pin(work))
            .await
            .map_err(|_| SyncError::PoolClosed)
    }

    /// Queues `work` without waiting
    ///
    /// # Errors
    /// [`SyncError::PoolSaturated`] if the queue is full,
    /// [`SyncError::PoolClosed`] if the pool is closed.
    pub fn try_submit<F>(&self, work: F) -> Result<(), SyncError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender()?
            .try_send(Box::pin(work))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SyncError::PoolSaturated,
                mpsc::error::TrySendError::Closed(_) => SyncError::PoolClosed,
            })
    }

    /// Stops accepting work, lets queued jobs finish and joins the workers
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let handles: Vec<_> = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping the sender lets detached workers drain and exit
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_every_job() {
        let pool = WorkerPool::new(4, 8);
        let wg = WaitGroup::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let guard = wg.add();
            let done = Arc::clone(&done);
            pool.submit(async move {
                let _guard = guard;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        wg.wait().await;
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(wg.outstanding(), 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3, 16);
        let wg = WaitGroup::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let guard = wg.add();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let _guard = guard;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        wg.wait().await;
        pool.close().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let pool = WorkerPool::new(1, 1);
        pool.close().await;
        assert!(matches!(pool.submit(async {}).await, Err(SyncError::PoolClosed)));
        assert!(matches!(pool.try_submit(async {}), Err(SyncError::PoolClosed)));
        // Second close is harmless
        pool.close().await;
    }

    #[tokio::test]
    async fn test_try_submit_reports_saturation() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only worker
        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .await
        .unwrap();
        started_rx.await.unwrap();

        // Fill the queue
        pool.try_submit(async {}).unwrap();
        assert!(matches!(pool.try_submit(async {}), Err(SyncError::PoolSaturated)));

        release_tx.send(()).unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn test_panicking_job_releases_guard_and_keeps_worker() {
        let pool = WorkerPool::new(1, 4);
        let wg = WaitGroup::new();

        let guard = wg.add();
        pool.submit(async move {
            let _guard = guard;
            panic!("boom");
        })
        .await
        .unwrap();

        let guard = wg.add();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        pool.submit(async move {
            let _guard = guard;
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        wg.wait().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_wait_with_nothing_outstanding_returns() {
        WaitGroup::new().wait().await;
    }
}
