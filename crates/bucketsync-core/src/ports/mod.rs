//! Port definitions
//!
//! Traits the engine depends on and the adapter crates implement.
//!
//! - [`IObjectStore`] - HEAD/GET/PUT/DELETE/LIST against one bucket and prefix
//! - [`IRemoteInvoker`] - Opaque "run this id elsewhere" capability used for
//!   bulk deletes at scale

pub mod object_store;
pub mod remote_invoker;

pub use object_store::IObjectStore;
pub use remote_invoker::{IRemoteInvoker, InvocationMode};
