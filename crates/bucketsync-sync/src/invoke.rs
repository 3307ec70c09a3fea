//! Bounded fan-out of remote invocations
//!
//! Used by bulk deletes at scale: each id is handed to another process
//! through [`IRemoteInvoker`], with at most `clients` calls in flight.
//! Failures are collected per id and never stop the remaining ids.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bucketsync_core::domain::StoreError;
use bucketsync_core::ports::{IRemoteInvoker, InvocationMode};

/// An id and its result; `None` if cancelled before the call
type CallOutcome = (i64, Option<Result<(), StoreError>>);

/// Outcome of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeReport {
    pub succeeded: u64,
    /// Failed ids with their error message
    pub failed: Vec<(i64, String)>,
    /// Ids skipped because cancellation fired first
    pub cancelled: u64,
}

impl InvokeReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}

/// Calls an invoker for many ids with bounded concurrency
#[derive(Clone)]
pub struct InvokeFanout {
    invoker: Arc<dyn IRemoteInvoker>,
    clients: usize,
}

impl std::fmt::Debug for InvokeFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeFanout")
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}

impl InvokeFanout {
    /// `clients` is raised to at least one
    pub fn new(invoker: Arc<dyn IRemoteInvoker>, clients: usize) -> Self {
        Self {
            invoker,
            clients: clients.max(1),
        }
    }

    pub fn clients(&self) -> usize {
        self.clients
    }

    /// Invokes every id in `ids`
    #[tracing::instrument(skip(self, ids, cancel), fields(clients = self.clients))]
    pub async fn run(&self, ids: Vec<i64>, mode: InvocationMode, cancel: &CancellationToken) -> InvokeReport {
        let permits = Arc::new(Semaphore::new(self.clients));
        let mut tasks = JoinSet::new();
        let mut report = InvokeReport::default();

        for id in ids {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled += 1;
                continue;
            };

            let invoker = Arc::clone(&self.invoker);
            let token = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if token.is_cancelled() {
                    return (id, None);
                }
                (id, Some(invoker.invoke(id, mode).await))
            });

            // Reap finished calls so the set does not grow with the id count
            while let Some(joined) = tasks.try_join_next() {
                Self::record(&mut report, joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::record(&mut report, joined);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            %mode,
            "Invocations finished"
        );
        report
    }

    fn record(report: &mut InvokeReport, joined: Result<CallOutcome, JoinError>) {
        match joined {
            Ok((_, Some(Ok(())))) => report.succeeded += 1,
            Ok((id, Some(Err(e)))) => {
                warn!(id, error = %e, "Invocation failed");
                report.failed.push((id, e.to_string()));
            }
            Ok((_, None)) => report.cancelled += 1,
            Err(e) => {
                warn!(error = %e, "Invocation task failed");
                report.failed.push((0, e.to_string()));
            }
        }
    }
}
