//! Integration tests for bucketsync-sync
//!
//! Drives the coordinator and lister end to end against the in-memory
//! object store, with faults injected per key.

mod common;

mod test_delete;
mod test_sync;
