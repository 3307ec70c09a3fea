//! Object store port
//!
//! Keys passed to every method are relative to the connection prefix the
//! adapter was created with. Adapters return [`StoreError`] so the engine can
//! tell a missing object from a transient failure.

use bytes::Bytes;

use crate::domain::{ListPage, PutOptions, RemoteObjectMetadata, StoreError};

// ============================================================================
// IObjectStore trait
// ============================================================================

/// Port trait for object store operations
///
/// Implementations must be safe to share between all workers of a
/// coordinator. Rate limiting is applied by the caller, not the adapter.
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Fetches an object's metadata
    ///
    /// # Returns
    /// `Ok(None)` if the object does not exist
    async fn head(&self, key: &str) -> Result<Option<RemoteObjectMetadata>, StoreError>;

    /// Downloads an object's content
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the object does not exist
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Uploads `body` to `key`, replacing any existing object
    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<(), StoreError>;

    /// Deletes an object
    ///
    /// Deleting a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Lists one page of objects whose key starts with `prefix`
    ///
    /// # Arguments
    /// * `prefix` - Key prefix, relative to the connection prefix
    /// * `continuation` - Token from the previous page, `None` for the first
    /// * `max_keys` - Upper bound on entries per page
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError>;

    /// Returns true if `key` exists
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.head(key).await?.is_some())
    }
}
