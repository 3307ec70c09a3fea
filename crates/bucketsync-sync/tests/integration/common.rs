//! Shared test helpers for engine integration tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use bucketsync_core::domain::{ListPage, PutOptions, RemoteObjectMetadata, StoreError};
use bucketsync_core::ports::IObjectStore;
use bucketsync_store::MemoryObjectStore;
use bucketsync_sync::lister::{ListOptions, Lister};
use bucketsync_sync::rate_limit::RateLimitSettings;
use bucketsync_sync::{RequestRateLimiter, SyncCoordinator, SyncOptions};

/// Options with a small pool and no periodic status lines.
pub fn options() -> SyncOptions {
    SyncOptions {
        workers: 4,
        queue_capacity: 16,
        status_interval: Duration::from_secs(3600),
        ..SyncOptions::default()
    }
}

pub fn limiter() -> Arc<RequestRateLimiter> {
    Arc::new(RequestRateLimiter::new(RateLimitSettings::default()))
}

pub fn coordinator(store: &Arc<MemoryObjectStore>, options: SyncOptions) -> SyncCoordinator {
    SyncCoordinator::new(store.clone(), limiter(), options, CancellationToken::new())
}

pub fn lister(store: &Arc<MemoryObjectStore>, options: ListOptions) -> Lister {
    Lister::new(store.clone(), limiter(), options, CancellationToken::new())
}

/// Writes `count` JSON files named `f000.json`, `f001.json`, ... under `dir`.
pub fn write_files(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("f{i:03}.json"));
            std::fs::write(&path, format!("{{\"n\":{i}}}")).expect("write fixture");
            path
        })
        .collect()
}

/// Key a fixture file is uploaded to with an empty prefix.
pub fn key(i: usize) -> String {
    format!("f{i:03}.json")
}

/// Store that fires `cancel` once `limit` PUTs or DELETEs have completed
pub struct CancelAfterWrites {
    inner: Arc<MemoryObjectStore>,
    cancel: CancellationToken,
    limit: usize,
    writes: AtomicUsize,
}

impl CancelAfterWrites {
    pub fn new(inner: &Arc<MemoryObjectStore>, cancel: &CancellationToken, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            cancel: cancel.clone(),
            limit,
            writes: AtomicUsize::new(0),
        })
    }

    fn wrote(&self) {
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
            self.cancel.cancel();
        }
    }
}

#[async_trait::async_trait]
impl IObjectStore for CancelAfterWrites {
    async fn head(&self, key: &str) -> Result<Option<RemoteObjectMetadata>, StoreError> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<(), StoreError> {
        let result = self.inner.put(key, body, options).await;
        self.wrote();
        result
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let result = self.inner.delete(key).await;
        self.wrote();
        result
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        self.inner.list_page(prefix, continuation, max_keys).await
    }
}
