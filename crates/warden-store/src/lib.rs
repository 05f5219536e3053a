//! Persistent state for the warden workflow: the task metadata cache,
//! the per-task context store, and the compliance records (quarantine
//! index, exception ledger).
//!
//! Every write follows lock → temp file → fsync → rename; readers never
//! observe a partially written document.

pub mod context;
pub mod datastore;
pub mod json;
pub mod ledger;
pub mod lock;
pub mod quarantine;

pub use context::store::ContextStore;
pub use datastore::{CacheInfo, Datastore};
