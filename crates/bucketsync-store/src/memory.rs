//! In-process object store
//!
//! Behaves like an S3 bucket for the operations the engine uses: ETags are
//! quoted MD5 digests, LIST is lexicographic with continuation tokens and
//! DELETE of a missing key succeeds. Faults can be injected per key to drive
//! retry paths in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use bucketsync_core::domain::{
    md5_hex, ListPage, ObjectEntry, PutOptions, RemoteObjectMetadata, StoreError,
};
use bucketsync_core::ports::IObjectStore;

/// A stored object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub options: PutOptions,
}

/// Request counters, one per operation
#[derive(Debug, Default)]
pub struct RequestCounts {
    pub head: AtomicU64,
    pub get: AtomicU64,
    pub put: AtomicU64,
    pub delete: AtomicU64,
    pub list: AtomicU64,
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining PUT failures per key
    put: HashMap<String, u32>,
    /// Remaining HEAD failures per key
    head: HashMap<String, u32>,
    /// Remaining DELETE failures per key
    delete: HashMap<String, u32>,
}

/// Thread-safe in-memory [`IObjectStore`]
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    faults: Mutex<Faults>,
    /// Keys in the order DELETE calls reached them
    delete_log: Mutex<Vec<String>>,
    counts: RequestCounts,
}

impl MemoryObjectStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object directly, bypassing counters and faults
    pub fn insert(&self, key: &str, body: impl Into<Bytes>) {
        let body = body.into();
        let object = StoredObject {
            etag: format!("\"{}\"", md5_hex(&body)),
            body,
            last_modified: Utc::now(),
            options: PutOptions::default(),
        };
        self.lock_objects().insert(key.to_string(), object);
    }

    /// Overrides an object's last-modified time
    ///
    /// Returns false if the key does not exist.
    pub fn set_last_modified(&self, key: &str, when: DateTime<Utc>) -> bool {
        match self.lock_objects().get_mut(key) {
            Some(object) => {
                object.last_modified = when;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of a stored object
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.lock_objects().get(key).cloned()
    }

    /// Returns all keys in lexicographic order
    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.lock_objects().len()
    }

    /// Returns true if the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `times` PUTs of `key` fail with a transient error
    pub fn fail_puts(&self, key: &str, times: u32) {
        self.lock_faults().put.insert(key.to_string(), times);
    }

    /// Makes the next `times` HEADs of `key` fail with a transient error
    pub fn fail_heads(&self, key: &str, times: u32) {
        self.lock_faults().head.insert(key.to_string(), times);
    }

    /// Makes the next `times` DELETEs of `key` fail with a transient error
    pub fn fail_deletes(&self, key: &str, times: u32) {
        self.lock_faults().delete.insert(key.to_string(), times);
    }

    /// Keys in the order DELETE requests arrived, including failed ones
    pub fn delete_log(&self) -> Vec<String> {
        self.delete_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Per-operation request counters
    pub fn counts(&self) -> &RequestCounts {
        &self.counts
    }

    /// Number of PUT requests received, failed ones included
    pub fn put_count(&self) -> u64 {
        self.counts.put.load(Ordering::Relaxed)
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Consumes one injected failure for `key`, if any remain
    fn take_fault(map: &mut HashMap<String, u32>, key: &str) -> bool {
        match map.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl IObjectStore for MemoryObjectStore {
    async fn head(&self, key: &str) -> Result<Option<RemoteObjectMetadata>, StoreError> {
        self.counts.head.fetch_add(1, Ordering::Relaxed);
        if Self::take_fault(&mut self.lock_faults().head, key) {
            return Err(StoreError::Server {
                status: 500,
                message: format!("injected HEAD failure for {key}"),
            });
        }

        Ok(self.lock_objects().get(key).map(|object| RemoteObjectMetadata {
            key: key.to_string(),
            size: object.body.len() as u64,
            last_modified: object.last_modified,
            etag: object.etag.clone(),
        }))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.counts.get.fetch_add(1, Ordering::Relaxed);
        self.lock_objects()
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<(), StoreError> {
        self.counts.put.fetch_add(1, Ordering::Relaxed);
        if Self::take_fault(&mut self.lock_faults().put, key) {
            return Err(StoreError::Throttled(format!("injected PUT failure for {key}")));
        }

        let object = StoredObject {
            etag: format!("\"{}\"", md5_hex(&body)),
            body,
            last_modified: Utc::now(),
            options: options.clone(),
        };
        self.lock_objects().insert(key.to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.counts.delete.fetch_add(1, Ordering::Relaxed);
        self.delete_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.to_string());

        if Self::take_fault(&mut self.lock_faults().delete, key) {
            return Err(StoreError::Server {
                status: 503,
                message: format!("injected DELETE failure for {key}"),
            });
        }

        self.lock_objects().remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        self.counts.list.fetch_add(1, Ordering::Relaxed);
        let objects = self.lock_objects();

        // The continuation token is the last key of the previous page
        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation.map_or(true, |after| key.as_str() > after));

        let entries: Vec<ObjectEntry> = matching
            .by_ref()
            .take(max_keys.max(1))
            .map(|(key, object)| ObjectEntry {
                key_raw: key.clone(),
                key: key.clone(),
                size: object.body.len() as u64,
                etag: object.etag.trim_matches('"').to_string(),
                last_modified: object.last_modified,
            })
            .collect();

        let next_continuation = if matching.next().is_some() {
            entries.last().map(|e| e.key_raw.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_continuation,
        })
    }
}
