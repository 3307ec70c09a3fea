//! Sync tasks and remote key derivation
//!
//! A [`SyncTask`] is created once per candidate file and consumed exactly
//! once by the worker pool. The retry controller re-submits the same task
//! value, so it is immutable after construction.

use std::path::{Component, Path, PathBuf};

use crate::domain::{content_type_for, DomainError, PutOptions};

/// A single local file scheduled for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    /// Local file the content is read from
    source: PathBuf,
    /// Destination key relative to the store connection
    key: String,
    /// Content type resolved from the file extension, if recognised
    content_type: Option<String>,
    /// Per-object ACL, overriding the pass default
    acl: Option<String>,
}

impl SyncTask {
    /// Creates a task for `source`, deriving its key from `root` and `prefix`
    ///
    /// # Errors
    /// Returns [`DomainError::PathNotInRoot`] if `source` is not below `root`
    /// and [`DomainError::InvalidPath`] if the relative path is empty or not UTF-8.
    pub fn new(source: impl Into<PathBuf>, root: &Path, prefix: &str) -> Result<Self, DomainError> {
        let source = source.into();
        let key = destination_key(&source, root, prefix)?;
        let content_type = content_type_for(&source).map(str::to_string);

        Ok(Self {
            source,
            key,
            content_type,
            acl: None,
        })
    }

    /// Applies per-object overrides, e.g. from a `path#ACL=..` suffix
    pub fn with_overrides(mut self, overrides: &PutOptions) -> Self {
        let merged = PutOptions::new(self.content_type(), self.acl.as_deref()).overridden_by(overrides);
        self.content_type = merged.content_type;
        self.acl = merged.acl;
        self
    }

    /// Returns the local source path
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Returns the destination key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the resolved content type
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the options to upload with, using `default_acl` unless overridden
    pub fn put_options(&self, default_acl: Option<&str>) -> PutOptions {
        PutOptions::new(self.content_type(), self.acl.as_deref().or(default_acl))
    }
}

/// Computes `join(prefix, source relative to root)` using `/` separators
///
/// # Errors
/// See [`SyncTask::new`].
pub fn destination_key(source: &Path, root: &Path, prefix: &str) -> Result<String, DomainError> {
    let relative = source
        .strip_prefix(root)
        .map_err(|_| DomainError::PathNotInRoot(source.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    DomainError::InvalidPath(format!("non UTF-8 path: {}", source.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => return Err(DomainError::InvalidPath(source.display().to_string())),
        }
    }

    if parts.is_empty() {
        return Err(DomainError::InvalidPath(format!(
            "{} has no path relative to {}",
            source.display(),
            root.display()
        )));
    }

    Ok(join_key(prefix, &parts.join("/")))
}

/// Joins two key fragments with a single `/`
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_start_matches('/');

    if prefix.is_empty() {
        key.to_string()
    } else if key.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Maps a numeric record identifier to its nested storage path
///
/// The decimal digits are split into groups of three:
/// `1159324849` becomes `115/932/484/9`.
///
/// # Errors
/// Returns [`DomainError::InvalidId`] for zero or negative identifiers.
pub fn id_to_path(id: i64) -> Result<String, DomainError> {
    if id <= 0 {
        return Err(DomainError::InvalidId(id.to_string()));
    }

    let digits = id.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .chunks(3)
        // Decimal digits are ASCII, so every chunk is valid UTF-8
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    Ok(groups.join("/"))
}
