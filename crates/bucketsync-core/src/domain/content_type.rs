//! Content type resolution by file extension

use std::path::Path;

/// Extension to content type table, lowercase extensions
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("json", "application/json"),
    ("geojson", "application/geo+json"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
];

/// Returns the content type for `path` based on its extension
///
/// Returns `None` when the extension is missing or unknown; the store then
/// applies its own default.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, content_type)| *content_type)
}
