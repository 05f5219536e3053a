//! Task types and the deterministic rank tables used by the picker.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque task identifier (convention: `TASK-` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    Todo,
    InProgress,
    Blocked,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Draft => "draft",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "draft" => Ok(TaskStatus::Draft),
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "invalid task status '{other}'. valid values: draft, todo, in_progress, blocked, completed"
            )),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    P0,
    P1,
    P2,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::P0 => "P0",
            TaskPriority::P1 => "P1",
            TaskPriority::P2 => "P2",
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "P0" => Ok(TaskPriority::P0),
            "P1" => Ok(TaskPriority::P1),
            "P2" => Ok(TaskPriority::P2),
            other => Err(format!(
                "invalid task priority '{other}'. valid values: P0, P1, P2"
            )),
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank used by the picker: blocked tasks surface first for manual
/// intervention, in-progress work resumes before new work starts.
/// Unknown values rank 99 so they sort last without failing.
pub fn status_rank(status: &str) -> u8 {
    match status {
        "blocked" => 0,
        "in_progress" => 1,
        "todo" => 2,
        "completed" => 3,
        _ => 99,
    }
}

/// Rank used by the picker. Unknown values rank 99.
pub fn priority_rank(priority: &str) -> u8 {
    match priority {
        "P0" => 0,
        "P1" => 1,
        "P2" => 2,
        _ => 99,
    }
}

/// Parsed form of one `*.task.yaml` file.
///
/// `status` and `priority` are kept as raw strings so unknown values
/// survive cache round-trips and rank last instead of failing discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub area: String,
    pub path: PathBuf,
    pub schema_version: String,
    pub unblocker: bool,
    pub order: Option<i64>,
    pub blocked_by: Vec<TaskId>,
    pub depends_on: Vec<TaskId>,
    pub blocked_reason: Option<String>,
    /// File mtime in unix milliseconds, for cache invalidation.
    pub mtime: i64,
    /// SHA-256 over the raw file bytes, for cache invalidation.
    pub hash: String,
}

impl Task {
    /// A task is ready when every hard blocker (`blocked_by`) is completed.
    /// `depends_on` is informational and never gates readiness.
    pub fn is_ready(&self, completed_ids: &BTreeSet<TaskId>) -> bool {
        self.blocked_by.iter().all(|dep| completed_ids.contains(dep))
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed.as_str()
    }

    /// True when the file lives under the archive tree.
    pub fn in_archive(&self) -> bool {
        self.path
            .components()
            .any(|c| c.as_os_str() == "completed-tasks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TaskStatus::Draft,
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_and_priority_rank_last() {
        assert_eq!(status_rank("blocked"), 0);
        assert_eq!(status_rank("in_progress"), 1);
        assert_eq!(status_rank("todo"), 2);
        assert_eq!(status_rank("completed"), 3);
        assert_eq!(status_rank("mystery"), 99);
        assert_eq!(priority_rank("P0"), 0);
        assert_eq!(priority_rank("P9"), 99);
    }

    #[test]
    fn readiness_ignores_depends_on() {
        let task = Task {
            id: TaskId::from("TASK-0001"),
            title: "t".to_string(),
            status: "todo".to_string(),
            priority: "P1".to_string(),
            area: "backend".to_string(),
            path: PathBuf::from("tasks/backend/TASK-0001.task.yaml"),
            schema_version: "1.0".to_string(),
            unblocker: false,
            order: None,
            blocked_by: vec![TaskId::from("TASK-0000")],
            depends_on: vec![TaskId::from("TASK-9999")],
            blocked_reason: None,
            mtime: 0,
            hash: String::new(),
        };

        let mut completed = BTreeSet::new();
        assert!(!task.is_ready(&completed));
        completed.insert(TaskId::from("TASK-0000"));
        assert!(task.is_ready(&completed));
    }
}
