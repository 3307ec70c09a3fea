//! ListObjectsV2 response parsing
//!
//! Only the fields the engine needs are deserialized; everything else in
//! the document (owner, storage class, common prefixes) is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use bucketsync_core::domain::{strip_etag_quotes, ListPage, ObjectEntry, StoreError};

use crate::relative_key;

/// Root element of a ListObjectsV2 response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
    #[serde(default)]
    contents: Vec<Contents>,
}

/// One `<Contents>` element
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Contents {
    key: String,
    last_modified: String,
    #[serde(rename = "ETag", default)]
    etag: String,
    #[serde(default)]
    size: u64,
}

/// Parses a ListObjectsV2 XML body into a [`ListPage`]
///
/// `connection_prefix` is stripped from each key to produce
/// [`ObjectEntry::key`]; [`ObjectEntry::key_raw`] keeps the full key.
pub fn parse_list_response(body: &str, connection_prefix: &str) -> Result<ListPage, StoreError> {
    let result: ListBucketResult = quick_xml::de::from_str(body)
        .map_err(|e| StoreError::InvalidResponse(format!("ListObjectsV2: {e}")))?;

    let entries = result
        .contents
        .into_iter()
        .map(|c| {
            let last_modified = DateTime::parse_from_rfc3339(&c.last_modified)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    StoreError::InvalidResponse(format!(
                        "bad LastModified '{}' for {}: {e}",
                        c.last_modified, c.key
                    ))
                })?;

            Ok(ObjectEntry {
                key: relative_key(connection_prefix, &c.key),
                etag: strip_etag_quotes(&c.etag).to_string(),
                key_raw: c.key,
                size: c.size,
                last_modified,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let next_continuation = if result.is_truncated {
        result.next_continuation_token.filter(|t| !t.is_empty())
    } else {
        None
    };

    Ok(ListPage {
        entries,
        next_continuation,
    })
}
