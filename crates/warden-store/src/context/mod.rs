//! Per-task context store: immutable provenance snapshot, mutable agent
//! coordination records, evidence attachments, standards excerpts,
//! worktree snapshots, and QA baselines.

pub mod delta;
pub mod evidence;
pub mod immutable;
pub mod models;
pub mod qa;
pub mod runtime;
pub mod store;

pub use models::*;
pub use store::ContextStore;
