//! Local tree walk
//!
//! Produces the regular files under a root, optionally filtered by
//! extension. Directories are descended into but never yielded, since the
//! store has no directory objects. Symlinks to files are yielded; symlinks
//! to directories are not followed.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::SyncError;

/// Walks a local directory tree
#[derive(Debug, Clone)]
pub struct LocalEnumerator {
    root: PathBuf,
    /// Lowercase extensions without the dot; empty accepts everything
    extensions: Vec<String>,
}

impl LocalEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
        }
    }

    /// Limits the walk to files with one of `extensions` (case-insensitive)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if `path` passes the extension filter
    pub fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }

    /// Sends every accepted file into `tx`, converted to `T`
    ///
    /// Waits when the channel is full. Stops early without error if the
    /// receiver is dropped. Unreadable subdirectories are logged and skipped.
    ///
    /// # Returns
    /// Number of files sent
    ///
    /// # Errors
    /// - [`SyncError::Io`] if the root cannot be read
    /// - [`SyncError::Cancelled`] if `cancel` fires during the walk
    pub async fn walk<T>(&self, tx: mpsc::Sender<T>, cancel: &CancellationToken) -> Result<u64, SyncError>
    where
        T: From<PathBuf>,
    {
        let root_meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| SyncError::io(&self.root, e))?;
        if !root_meta.is_dir() {
            return Err(SyncError::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let mut sent = 0u64;
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == self.root => return Err(SyncError::io(&dir, e)),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(path = %dir.display(), error = %e, "Directory listing interrupted");
                        break;
                    }
                };

                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot stat entry");
                        continue;
                    }
                };

                let is_file = if file_type.is_dir() {
                    stack.push(path);
                    continue;
                } else if file_type.is_symlink() {
                    tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file())
                } else {
                    file_type.is_file()
                };

                if !is_file || !self.accepts(&path) {
                    continue;
                }

                if tx.send(T::from(path)).await.is_err() {
                    debug!(sent, "Receiver dropped, stopping walk");
                    return Ok(sent);
                }
                sent += 1;
            }
        }

        debug!(root = %self.root.display(), sent, "Walk finished");
        Ok(sent)
    }
}
