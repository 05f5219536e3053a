//! External process boundary: git and archiving tools.
//!
//! The store never shells out directly; everything goes through
//! [`command::GitCli`] or [`process::ProcessRunner`], which attach
//! timeouts, retries for idempotent git reads, and tracing spans.

pub mod command;
pub mod diff;
pub mod error;
pub mod process;
pub mod repo;

pub use command::{GitCli, GitOutput};
pub use error::GitError;
pub use process::{ProcessError, ProcessOutput, ProcessRunner};
pub use repo::RepoHandle;
