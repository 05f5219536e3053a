//! Task lifecycle operations: claim, complete, archive, and the status
//! transition rules behind them.
//!
//! Status rewrites edit only the top-level `status:` line so the rest of
//! the file (comments, ordering, quoting) survives untouched.

use std::path::{Path, PathBuf};

use warden_core::types::{Task, TaskId};
use warden_core::{RepoLayout, WorkflowError};
use warden_notify::{NotificationDispatcher, NotificationMessage};
use warden_store::ContextStore;

pub struct TaskOperations {
    layout: RepoLayout,
    notifier: NotificationDispatcher,
}

impl TaskOperations {
    pub fn new(layout: RepoLayout) -> Self {
        Self {
            layout,
            notifier: NotificationDispatcher::from_env(),
        }
    }

    /// Claim a task: `todo` or `blocked` → `in_progress`. Draft tasks get
    /// a dedicated message pointing at the clarification workflow.
    pub fn claim_task(&self, task: &Task) -> Result<PathBuf, WorkflowError> {
        if task.status == "draft" {
            return Err(WorkflowError::blocker(format!(
                "cannot claim task {}: status is 'draft'. Resolve clarifications, attach evidence, and transition to 'todo' first",
                task.id
            )));
        }
        if task.status != "todo" && task.status != "blocked" {
            return Err(WorkflowError::blocker(format!(
                "cannot claim task {}: status is '{}'. Only 'todo' or 'blocked' tasks can be claimed",
                task.id, task.status
            )));
        }

        update_status_line(&task.path, "in_progress")?;
        Ok(task.path.clone())
    }

    /// Complete a task: rewrite status, archive the file, notify, and
    /// purge the task's context (purge failure is non-fatal).
    pub fn complete_task(&self, task: &Task, archive: bool) -> Result<PathBuf, WorkflowError> {
        if task.status == "completed" {
            return Err(WorkflowError::blocker(format!(
                "task {} is already completed",
                task.id
            )));
        }
        if task.status == "draft" {
            return Err(WorkflowError::blocker(format!(
                "cannot complete task {}: status is 'draft'. Resolve clarifications, attach evidence, and transition to 'todo' first",
                task.id
            )));
        }

        update_status_line(&task.path, "completed")?;

        let final_path = if archive {
            self.archive_file(&task.path, &task.id)?
        } else {
            task.path.clone()
        };

        let _ = self
            .notifier
            .dispatch(&NotificationMessage::success(&task.id, &task.title));

        if let Err(err) = ContextStore::new(self.layout.clone()).purge_context(&task.id) {
            tracing::warn!("failed to purge context for {}: {err}", task.id);
        }

        Ok(final_path)
    }

    /// Archive an already-completed task without changing its status.
    /// The on-disk YAML is re-read; a cached model that disagrees with
    /// the file refuses rather than moving stale state.
    pub fn archive_task(&self, task: &Task) -> Result<PathBuf, WorkflowError> {
        if !task.path.exists() {
            return Err(WorkflowError::io(format!(
                "task file not found: {}",
                task.path.display()
            )));
        }
        if task.in_archive() {
            return Ok(task.path.clone());
        }
        if task.status != "completed" {
            return Err(WorkflowError::blocker(format!(
                "cannot archive task {}: status is '{}'. Only completed tasks can be archived",
                task.id, task.status
            )));
        }

        let file_status = read_status_line(&task.path)?;
        if file_status.as_deref() != Some("completed") {
            return Err(WorkflowError::blocker(format!(
                "cannot archive task {}: file status is '{}'. Resolve status before archiving",
                task.id,
                file_status.unwrap_or_default()
            )));
        }

        self.archive_file(&task.path, &task.id)
    }

    /// Transition to an arbitrary status, enforcing the transition matrix
    /// unless `validate` is off.
    pub fn transition_status(
        &self,
        task: &Task,
        to_status: &str,
        validate: bool,
    ) -> Result<PathBuf, WorkflowError> {
        const VALID: [&str; 5] = ["draft", "todo", "in_progress", "blocked", "completed"];
        if !VALID.contains(&to_status) {
            return Err(WorkflowError::validation(format!(
                "invalid status '{to_status}'. Must be one of: {}",
                VALID.join(", ")
            )));
        }

        if validate {
            validate_transition(&task.id, &task.status, to_status)?;
        }

        update_status_line(&task.path, to_status)?;
        Ok(task.path.clone())
    }

    fn archive_file(&self, task_path: &Path, task_id: &TaskId) -> Result<PathBuf, WorkflowError> {
        let archive_dir = self.layout.archive_dir();
        std::fs::create_dir_all(&archive_dir)?;

        let file_name = task_path.file_name().ok_or_else(|| {
            WorkflowError::validation(format!("task path has no file name: {}", task_path.display()))
        })?;
        let destination = archive_dir.join(file_name);

        if destination.exists() {
            return Err(WorkflowError::blocker(format!(
                "archive destination already exists: {}. Task {task_id} may already be archived",
                destination.display()
            )));
        }

        std::fs::rename(task_path, &destination)?;
        Ok(destination)
    }
}

/// Transition matrix: nothing leaves `completed`; `draft` only moves to
/// `todo` or `blocked`; everything else is allowed (solo-developer
/// flexibility).
fn validate_transition(task_id: &TaskId, from: &str, to: &str) -> Result<(), WorkflowError> {
    if from == "completed" {
        return Err(WorkflowError::blocker(format!(
            "cannot transition task {task_id} from 'completed' to '{to}'. Completed tasks cannot be reopened"
        )));
    }
    if from == to {
        return Ok(());
    }
    if from == "draft" && !matches!(to, "draft" | "todo" | "blocked") {
        return Err(WorkflowError::blocker(
            "draft tasks can only transition to 'todo' or 'blocked' after clarifications are resolved",
        ));
    }
    Ok(())
}

/// Replace the first top-level `status:` line, writing atomically.
fn update_status_line(path: &Path, new_status: &str) -> Result<(), WorkflowError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| WorkflowError::io(format!("cannot read {}: {err}", path.display())))?;

    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        if !replaced && line.starts_with("status:") {
            lines.push(format!("status: {new_status}"));
            replaced = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !replaced {
        return Err(WorkflowError::validation(format!(
            "no top-level status field in {}",
            path.display()
        )));
    }

    let mut rendered = lines.join("\n");
    if content.ends_with('\n') {
        rendered.push('\n');
    }

    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, rendered)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_status_line(path: &Path) -> Result<Option<String>, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .find(|line| line.starts_with("status:"))
        .map(|line| line["status:".len()..].trim().to_string()))
}
