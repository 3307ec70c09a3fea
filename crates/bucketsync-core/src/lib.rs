//! Bucketsync Core - Domain types, configuration and ports
//!
//! This crate contains:
//! - **Domain types** - `SyncTask`, `RemoteObjectMetadata`, `ObjectEntry`, `SyncStats`, `Dsn`
//! - **Port definitions** - Traits for adapters: `IObjectStore`, `IRemoteInvoker`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The engine in `bucketsync-sync` only talks to the object store through
//! the [`ports::IObjectStore`] trait. Concrete adapters (HTTP, in-memory)
//! live in `bucketsync-store`.

pub mod config;
pub mod domain;
pub mod ports;
