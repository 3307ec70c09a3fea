//! Change detection
//!
//! Decides whether the remote copy of a file is stale using only HEAD
//! metadata. The steps short-circuit in order:
//!
//! 1. No remote object: upload.
//! 2. MD5 of the local bytes equals the ETag: skip.
//! 3. Local mtime older than the remote last-modified time: skip and warn.
//! 4. Otherwise: upload.
//!
//! Step 3 keeps a stale local tree from clobbering a newer remote copy. It is
//! a heuristic, not a guarantee: two writers finishing within the same
//! second can still overwrite each other.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use bucketsync_core::domain::{md5_hex, RemoteObjectMetadata};
use bucketsync_core::ports::IObjectStore;

use crate::SyncError;

// ============================================================================
// LocalFile
// ============================================================================

/// A local file read into memory once
///
/// The same buffer is hashed for change detection and sent as the PUT body,
/// so the uploaded bytes are exactly the ones that were compared.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub body: Bytes,
    pub modified: DateTime<Utc>,
}

impl LocalFile {
    /// Reads `path` and its modification time
    ///
    /// # Errors
    /// [`SyncError::Io`]; a path that is not a regular file reports
    /// [`io::ErrorKind::InvalidInput`].
    pub async fn read(path: &Path) -> Result<Self, SyncError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        if !metadata.is_file() {
            return Err(SyncError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let body = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);

        Ok(Self {
            path: path.to_path_buf(),
            body: Bytes::from(body),
            modified: DateTime::<Utc>::from(modified),
        })
    }

    /// Hex MD5 of the content
    pub fn content_hash(&self) -> String {
        md5_hex(&self.body)
    }
}

// ============================================================================
// ChangeDetector
// ============================================================================

/// Outcome of comparing a local file with its remote counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeVerdict {
    /// No remote object exists
    Missing,
    /// Content differs and the local copy is not older
    Changed,
    /// Content hash matches the ETag
    Unchanged,
    /// Content differs but the remote copy is newer
    StaleLocal,
}

impl ChangeVerdict {
    /// Returns true if the file should be uploaded
    pub fn needs_upload(self) -> bool {
        matches!(self, Self::Missing | Self::Changed)
    }
}

/// Compares local files with remote metadata
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn IObjectStore>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector").finish_non_exhaustive()
    }
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn IObjectStore>) -> Self {
        Self { store }
    }

    /// Compares an already-read local file with the remote object at `key`
    ///
    /// Does not modify remote state.
    ///
    /// # Errors
    /// Any HEAD failure other than "not found" is returned unchanged.
    pub async fn evaluate(&self, key: &str, local: &LocalFile) -> Result<ChangeVerdict, SyncError> {
        let Some(remote) = self.store.head(key).await? else {
            debug!(key, "No remote object");
            return Ok(ChangeVerdict::Missing);
        };

        Ok(Self::compare(key, local, &remote))
    }

    fn compare(key: &str, local: &LocalFile, remote: &RemoteObjectMetadata) -> ChangeVerdict {
        let local_hash = local.content_hash();
        if local_hash == remote.content_hash() {
            return ChangeVerdict::Unchanged;
        }

        if local.modified < remote.last_modified {
            warn!(
                key,
                path = %local.path.display(),
                local_modified = %local.modified,
                remote_modified = %remote.last_modified,
                "Remote copy is newer than local file, not uploading"
            );
            return ChangeVerdict::StaleLocal;
        }

        debug!(key, local_hash = %local_hash, remote_hash = remote.content_hash(), "Content changed");
        ChangeVerdict::Changed
    }

    /// Returns true if the file at `local_path` should be uploaded to `key`
    ///
    /// # Errors
    /// [`SyncError::Io`] if the local file cannot be read, or the HEAD error.
    pub async fn has_changed(&self, local_path: &Path, key: &str) -> Result<bool, SyncError> {
        let local = LocalFile::read(local_path).await?;
        Ok(self.evaluate(key, &local).await?.needs_upload())
    }
}
