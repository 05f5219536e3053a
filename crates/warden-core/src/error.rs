//! Unified error taxonomy for warden operations.
//!
//! Every mutating API surfaces one of these variants; the CLI layer maps
//! them to exit codes and to the structured JSON error envelope
//! (`code`, `name`, `message`, `details`, `recovery_action`).

use serde_json::json;

use crate::types::TaskId;

/// Exit code for a workflow halt (blocked unblockers). Distinct from the
/// general error exit so CI can tell "stop the world" apart from a bug.
pub const EXIT_HALT: i32 = 2;
pub const EXIT_GENERAL: i32 = 1;
pub const EXIT_VALIDATION: i32 = 10;
pub const EXIT_DRIFT: i32 = 20;
pub const EXIT_BLOCKER: i32 = 30;
pub const EXIT_IO: i32 = 40;
pub const EXIT_GIT: i32 = 50;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Bad input, schema violation, secret found, invalid transition.
    #[error("{message}")]
    Validation { message: String },

    /// Worktree state does not match a recorded snapshot, or the expected
    /// role has no snapshot. Carries the offending file list when known.
    #[error("{message}")]
    Drift {
        message: String,
        files: Vec<String>,
    },

    /// Quarantined task or denied transition.
    #[error("{message}")]
    Blocker { message: String },

    /// Missing file or unreadable artifact.
    #[error("{message}")]
    Io { message: String },

    /// External git command failure.
    #[error("{message}")]
    Git { message: String },

    /// Workflow halt: at least one unblocker task is blocked.
    #[error("workflow halted: {reason}")]
    Halt {
        reason: String,
        task_ids: Vec<TaskId>,
    },

    #[error("{message}")]
    General { message: String },
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            message: message.into(),
        }
    }

    pub fn drift(message: impl Into<String>, files: Vec<String>) -> Self {
        WorkflowError::Drift {
            message: message.into(),
            files,
        }
    }

    pub fn blocker(message: impl Into<String>) -> Self {
        WorkflowError::Blocker {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        WorkflowError::Io {
            message: message.into(),
        }
    }

    pub fn git(message: impl Into<String>) -> Self {
        WorkflowError::Git {
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        WorkflowError::General {
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            WorkflowError::Validation { .. } => EXIT_VALIDATION,
            WorkflowError::Drift { .. } => EXIT_DRIFT,
            WorkflowError::Blocker { .. } => EXIT_BLOCKER,
            WorkflowError::Io { .. } => EXIT_IO,
            WorkflowError::Git { .. } => EXIT_GIT,
            WorkflowError::Halt { .. } => EXIT_HALT,
            WorkflowError::General { .. } => EXIT_GENERAL,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "E010",
            WorkflowError::Drift { .. } => "E020",
            WorkflowError::Blocker { .. } => "E030",
            WorkflowError::Io { .. } => "E040",
            WorkflowError::Git { .. } => "E050",
            WorkflowError::Halt { .. } => "E002",
            WorkflowError::General { .. } => "E001",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "ValidationError",
            WorkflowError::Drift { .. } => "DriftError",
            WorkflowError::Blocker { .. } => "BlockerError",
            WorkflowError::Io { .. } => "IoError",
            WorkflowError::Git { .. } => "GitError",
            WorkflowError::Halt { .. } => "WorkflowHalt",
            WorkflowError::General { .. } => "GeneralError",
        }
    }

    pub fn recovery_action(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "Fix the reported input and retry",
            WorkflowError::Drift { .. } => {
                "Re-run snapshot-worktree after reconciling the working tree"
            }
            WorkflowError::Blocker { .. } => "Resolve the blocking condition first",
            WorkflowError::Io { .. } => "Verify the path exists and is readable",
            WorkflowError::Git { .. } => "Check git state and retry",
            WorkflowError::Halt { .. } => "Fix the blocked unblocker tasks before resuming",
            WorkflowError::General { .. } => "Check error details and retry",
        }
    }

    /// Structured error envelope for `--format json` output.
    pub fn to_envelope(&self) -> serde_json::Value {
        let details = match self {
            WorkflowError::Drift { files, .. } => json!({ "files": files }),
            WorkflowError::Halt { task_ids, .. } => json!({
                "task_ids": task_ids.iter().map(|t| t.0.clone()).collect::<Vec<_>>(),
            }),
            _ => json!({}),
        };
        json!({
            "success": false,
            "data": null,
            "error": {
                "code": self.code(),
                "name": self.name(),
                "message": self.to_string(),
                "details": details,
                "recovery_action": self.recovery_action(),
            },
        })
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(source: std::io::Error) -> Self {
        WorkflowError::Io {
            message: source.to_string(),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(source: serde_json::Error) -> Self {
        WorkflowError::Validation {
            message: format!("invalid JSON: {source}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            WorkflowError::validation("v"),
            WorkflowError::drift("d", vec![]),
            WorkflowError::blocker("b"),
            WorkflowError::io("i"),
            WorkflowError::git("g"),
            WorkflowError::Halt {
                reason: "r".to_string(),
                task_ids: vec![],
            },
            WorkflowError::general("x"),
        ];
        let mut codes: Vec<i32> = errors.iter().map(WorkflowError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 7);
        assert_eq!(
            WorkflowError::Halt {
                reason: "r".to_string(),
                task_ids: vec![],
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn envelope_carries_halt_task_ids() {
        let err = WorkflowError::Halt {
            reason: "blocked unblockers".to_string(),
            task_ids: vec![TaskId::from("TASK-0001")],
        };
        let envelope = err.to_envelope();
        assert_eq!(envelope["error"]["code"], "E002");
        assert_eq!(envelope["error"]["details"]["task_ids"][0], "TASK-0001");
    }
}
