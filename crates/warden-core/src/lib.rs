//! Core task model for the warden workflow CLI.
//!
//! Holds the parsed task record, the YAML parser and on-disk discovery,
//! the repository layout, the unified error taxonomy, and the secret scan
//! used before anything is written into a task context.

pub mod error;
pub mod hash;
pub mod layout;
pub mod parser;
pub mod secrets;
pub mod types;

pub use error::WorkflowError;
pub use layout::RepoLayout;
pub use parser::TaskParser;
pub use types::{Task, TaskId, TaskPriority, TaskStatus};
