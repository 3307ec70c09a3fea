//! Integration tests for bucketsync-store
//!
//! Uses wiremock to simulate an S3-compatible endpoint and a function
//! invocation endpoint, and verifies the wire behaviour of
//! `HttpObjectStore` and `HttpInvoker`.

mod common;

mod test_invoker;
mod test_listing;
mod test_object_ops;
