//! Remote object metadata and listing entries

use std::fmt;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Snapshot of a remote object's metadata, as returned by HEAD
///
/// Fetched per call and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectMetadata {
    /// Key relative to the connection prefix
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modification time reported by the store
    pub last_modified: DateTime<Utc>,
    /// ETag as returned by the store, possibly quoted
    pub etag: String,
}

impl RemoteObjectMetadata {
    /// Returns the ETag with surrounding quote characters stripped
    pub fn content_hash(&self) -> &str {
        strip_etag_quotes(&self.etag)
    }
}

/// Hex MD5 digest of `data`, the ETag S3 assigns to single-part uploads
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Strips the `"` characters stores wrap around ETags
pub fn strip_etag_quotes(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// One object from a LIST page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Full key in the bucket, including the connection prefix
    pub key_raw: String,
    /// Key with the connection prefix removed
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// ETag with quotes stripped
    pub etag: String,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

impl fmt::Display for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.key,
            self.size,
            self.last_modified.to_rfc3339(),
            self.etag
        )
    }
}

/// A single page of a paginated listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page
    pub entries: Vec<ObjectEntry>,
    /// Token for the next page, `None` on the last page
    pub next_continuation: Option<String>,
}

/// Per-object metadata attached to a PUT
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    /// Content type; the store default applies when unset
    pub content_type: Option<String>,
    /// Canned ACL, e.g. `public-read`
    pub acl: Option<String>,
}

impl PutOptions {
    /// Creates options with the given content type and ACL
    pub fn new(content_type: Option<&str>, acl: Option<&str>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            acl: acl.map(str::to_string),
        }
    }

    /// Returns `other`'s fields where set, falling back to `self`
    pub fn overridden_by(&self, other: &PutOptions) -> PutOptions {
        PutOptions {
            content_type: other.content_type.clone().or_else(|| self.content_type.clone()),
            acl: other.acl.clone().or_else(|| self.acl.clone()),
        }
    }
}

/// Splits `key#ACL=value,ContentType=value` into the key and its overrides
///
/// Names are case-insensitive and unknown names are ignored. A key without
/// `#` yields empty options.
///
/// # Errors
/// Returns [`DomainError::InvalidExtras`] if a pair is not `name=value`.
pub fn parse_key_extras(raw: &str) -> Result<(String, PutOptions), DomainError> {
    let Some((key, extras)) = raw.split_once('#') else {
        return Ok((raw.to_string(), PutOptions::default()));
    };

    let mut options = PutOptions::default();
    for pair in extras.split(',').filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| DomainError::InvalidExtras(format!("'{pair}' in '{raw}'")))?;

        match name.trim().to_ascii_lowercase().as_str() {
            "acl" => options.acl = Some(value.trim().to_string()),
            "contenttype" => options.content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Ok((key.to_string(), options))
}
