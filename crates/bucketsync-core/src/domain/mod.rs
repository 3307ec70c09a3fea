//! Domain types
//!
//! Plain data and pure functions shared by the engine and the adapters.
//! Nothing in here performs I/O.

pub mod content_type;
pub mod dsn;
pub mod errors;
pub mod object;
pub mod stats;
pub mod task;

pub use content_type::content_type_for;
pub use dsn::{Credentials, Dsn};
pub use errors::{DomainError, StoreError};
pub use object::{
    md5_hex, parse_key_extras, strip_etag_quotes, ListPage, ObjectEntry, PutOptions, RemoteObjectMetadata,
};
pub use stats::{StatsSnapshot, SyncStats};
pub use task::{destination_key, id_to_path, join_key, SyncTask};
