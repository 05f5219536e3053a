use std::path::PathBuf;
use std::string::FromUtf8Error;

use warden_core::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git command failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git command returned non-zero exit ({command}) status={status:?}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
    },
    #[error("git command failed ({command}) status={status:?}: {stderr}")]
    CommandFailedWithStderr {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("git command timed out after {timeout_secs}s ({command})")]
    Timeout {
        command: String,
        timeout_secs: u64,
    },
    #[error("git command output was not valid UTF-8 ({command}, {stream}): {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: FromUtf8Error,
    },
    #[error("path is not inside a git repository: {path}")]
    NotARepository { path: PathBuf },
    #[error("invalid git output: {context}")]
    Parse { context: String },
}

impl GitError {
    /// Only plain non-zero exits without stderr are retried; timeouts and
    /// everything else are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::CommandFailed { .. })
    }
}

impl From<GitError> for WorkflowError {
    fn from(err: GitError) -> Self {
        WorkflowError::git(err.to_string())
    }
}
