//! Bucketsync Store - Adapters for the object store and invoker ports
//!
//! ## Modules
//!
//! - [`client`] - S3-compatible REST client implementing `IObjectStore`
//! - [`listing`] - ListObjectsV2 response parsing
//! - [`memory`] - In-process `IObjectStore` with fault injection, for tests
//!   and dry experiments
//! - [`invoker`] - HTTP implementation of `IRemoteInvoker`

pub mod client;
pub mod invoker;
pub mod listing;
pub mod memory;

pub use client::HttpObjectStore;
pub use invoker::HttpInvoker;
pub use memory::MemoryObjectStore;

/// Removes the connection prefix from a full bucket key
pub(crate) fn relative_key(prefix: &str, raw: &str) -> String {
    if prefix.is_empty() {
        return raw.to_string();
    }
    match raw.strip_prefix(prefix) {
        Some("") => String::new(),
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => raw.to_string(),
    }
}
