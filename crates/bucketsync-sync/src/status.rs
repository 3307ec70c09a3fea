//! Periodic progress reporter
//!
//! Only reads counters. It never blocks or gates the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bucketsync_core::domain::SyncStats;

/// Logs counter totals and deltas every `interval` until stopped
#[derive(Debug)]
pub struct StatusReporter {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl StatusReporter {
    /// Starts reporting; stops by itself when `parent` is cancelled
    pub fn spawn(stats: Arc<SyncStats>, interval: Duration, parent: &CancellationToken) -> Self {
        let stop = parent.child_token();
        let token = stop.clone();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut previous = stats.snapshot();

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = stats.snapshot();
                        let delta = current.since(&previous);
                        info!(
                            scheduled_delta = delta.scheduled,
                            completed_delta = delta.completed,
                            "{current}"
                        );
                        previous = current;
                    }
                }
            }
        });

        Self { stop, handle }
    }

    /// Stops the reporter and waits for it to exit
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}
