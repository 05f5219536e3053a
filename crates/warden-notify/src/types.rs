use serde::{Deserialize, Serialize};

use warden_core::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSinkKind {
    Stdout,
    Telegram,
    Ntfy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub severity: NotificationSeverity,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

impl NotificationMessage {
    pub fn success(task_id: &TaskId, title: &str) -> Self {
        Self {
            severity: NotificationSeverity::Info,
            title: format!("Task completed: {title}"),
            body: format!("{task_id} finished and was archived."),
            task_id: Some(task_id.clone()),
        }
    }

    pub fn failure(task_id: &TaskId, title: &str, detail: &str) -> Self {
        Self {
            severity: NotificationSeverity::Error,
            title: format!("Task failed: {title}"),
            body: format!("{task_id}: {detail}"),
            task_id: Some(task_id.clone()),
        }
    }

    pub fn warning(task_id: &TaskId, title: &str, detail: &str) -> Self {
        Self {
            severity: NotificationSeverity::Warning,
            title: format!("Task warning: {title}"),
            body: format!("{task_id}: {detail}"),
            task_id: Some(task_id.clone()),
        }
    }
}
