//! Command handlers. Each handler renders text or JSON through the
//! invocation's [`crate::output::OutputChannel`] and returns a
//! [`warden_core::WorkflowError`] that `main` maps to an exit code.

pub mod context;
pub mod evidence;
pub mod exceptions;
pub mod qa;
pub mod quarantine;
pub mod tasks;
pub mod worktree;

use std::collections::BTreeSet;

use warden_core::types::{Task, TaskId};
use warden_core::{RepoLayout, WorkflowError};
use warden_store::Datastore;

use crate::graph::DependencyGraph;

/// Tasks plus the graph built over them; most read commands start here.
pub struct World {
    pub tasks: Vec<Task>,
    pub graph: DependencyGraph,
}

impl World {
    pub fn load(layout: &RepoLayout, force_refresh: bool) -> Result<Self, WorkflowError> {
        let datastore = Datastore::new(layout.clone());
        let tasks = datastore.load_tasks(force_refresh)?;
        let graph = DependencyGraph::new(tasks.clone());
        Ok(Self { tasks, graph })
    }

    pub fn completed_ids(&self) -> BTreeSet<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.is_completed())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn find_by_id(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *task_id)
    }

    pub fn find_by_path(&self, path: &std::path::Path) -> Option<&Task> {
        let wanted = path.canonicalize().ok()?;
        self.tasks
            .iter()
            .find(|t| t.path.canonicalize().map(|p| p == wanted).unwrap_or(false))
    }
}

/// Serialize a task for JSON output with deterministic ordering.
pub fn task_to_json(task: &Task) -> serde_json::Value {
    let mut blocked_by: Vec<&str> = task.blocked_by.iter().map(TaskId::as_str).collect();
    blocked_by.sort_unstable();
    let mut depends_on: Vec<&str> = task.depends_on.iter().map(TaskId::as_str).collect();
    depends_on.sort_unstable();

    serde_json::json!({
        "area": task.area,
        "blocked_by": blocked_by,
        "blocked_reason": task.blocked_reason,
        "depends_on": depends_on,
        "hash": task.hash,
        "id": task.id,
        "mtime": task.mtime,
        "order": task.order,
        "path": task.path,
        "priority": task.priority,
        "schema_version": task.schema_version,
        "status": task.status,
        "title": task.title,
        "unblocker": task.unblocker,
    })
}
