//! Deterministic task selection.
//!
//! Unblocker tasks sort before everything else, including P0
//! non-unblockers; the full ordering is the tuple
//! (unblocker, status, priority, order, id).

use std::collections::BTreeSet;

use warden_core::types::{priority_rank, status_rank, Task, TaskId};
use warden_core::WorkflowError;

use crate::graph::DependencyGraph;

/// Order value used when a task declares none.
const UNSET_ORDER: i64 = 9999;

pub struct TaskPicker<'a> {
    tasks: &'a [Task],
    graph: &'a DependencyGraph,
}

/// Raise a halt when any unblocker task is blocked. The workflow must not
/// pick new work past a blocked unblocker.
pub fn check_halt_conditions(tasks: &[Task]) -> Result<(), WorkflowError> {
    let blocked_unblockers: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.unblocker && t.status == "blocked")
        .collect();

    if blocked_unblockers.is_empty() {
        return Ok(());
    }

    let mut details = Vec::new();
    for task in &blocked_unblockers {
        let reason = task.blocked_reason.as_deref().unwrap_or("(no reason specified)");
        details.push(format!("  - {}: {reason}", task.id));
    }

    Err(WorkflowError::Halt {
        reason: format!(
            "{} unblocker task(s) blocked. Manual intervention required:\n{}\n\nFix these unblockers before resuming the workflow.",
            blocked_unblockers.len(),
            details.join("\n")
        ),
        task_ids: blocked_unblockers.iter().map(|t| t.id.clone()).collect(),
    })
}

pub fn sort_key(task: &Task) -> (u8, u8, u8, i64, TaskId) {
    (
        u8::from(!task.unblocker),
        status_rank(&task.status),
        priority_rank(&task.priority),
        task.order.unwrap_or(UNSET_ORDER),
        task.id.clone(),
    )
}

impl<'a> TaskPicker<'a> {
    pub fn new(tasks: &'a [Task], graph: &'a DependencyGraph) -> Self {
        Self { tasks, graph }
    }

    /// Pick the next task. Halt conditions are checked before readiness,
    /// so a blocked unblocker halts even under a status filter.
    pub fn pick_next(
        &self,
        completed_ids: &BTreeSet<TaskId>,
        status_filter: Option<&str>,
    ) -> Result<Option<(Task, String)>, WorkflowError> {
        check_halt_conditions(self.tasks)?;

        let mut ready = self.graph.topological_ready_set(completed_ids);
        if let Some(filter) = status_filter {
            ready.retain(|task| task.status == filter);
        }
        if ready.is_empty() {
            return Ok(None);
        }

        ready.sort_by_key(sort_key);
        let chosen = ready.remove(0);
        let reason = pick_reason(&chosen);
        Ok(Some((chosen, reason)))
    }

    /// Same ordering as pick, including completed tasks; optionally
    /// filtered by status or restricted to unblockers.
    pub fn list_tasks(&self, status_filter: Option<&str>, unblocker_only: bool) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| status_filter.is_none_or(|f| t.status == f))
            .filter(|t| !unblocker_only || t.unblocker)
            .cloned()
            .collect();
        tasks.sort_by_key(sort_key);
        tasks
    }
}

fn pick_reason(task: &Task) -> String {
    if task.unblocker {
        format!("unblocker task ({} {})", task.priority, task.status)
    } else {
        format!(
            "highest priority ready task ({} {})",
            task.priority, task.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mk_task(id: &str, status: &str, priority: &str, unblocker: bool, blocked_by: &[&str]) -> Task {
        Task {
            id: TaskId::from(id),
            title: format!("Task {id}"),
            status: status.to_string(),
            priority: priority.to_string(),
            area: "backend".to_string(),
            path: PathBuf::from(format!("tasks/backend/{id}.task.yaml")),
            schema_version: "1.0".to_string(),
            unblocker,
            order: None,
            blocked_by: blocked_by.iter().map(|s| TaskId::from(*s)).collect(),
            depends_on: Vec::new(),
            blocked_reason: None,
            mtime: 0,
            hash: String::new(),
        }
    }

    fn completed(tasks: &[Task]) -> BTreeSet<TaskId> {
        tasks
            .iter()
            .filter(|t| t.is_completed())
            .map(|t| t.id.clone())
            .collect()
    }

    #[test]
    fn unblocker_beats_higher_priority() {
        // A: P2 unblocker; B: P0; C: P0 blocked by A.
        let tasks = vec![
            mk_task("TASK-A", "todo", "P2", true, &[]),
            mk_task("TASK-B", "todo", "P0", false, &[]),
            mk_task("TASK-C", "todo", "P0", false, &["TASK-A"]),
        ];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);

        let (chosen, reason) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
        assert_eq!(chosen.id.as_str(), "TASK-A");
        assert!(reason.contains("unblocker"));

        // After completing A, the lexicographic tiebreak picks B.
        let mut tasks = tasks;
        tasks[0].status = "completed".to_string();
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);
        let (chosen, _) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
        assert_eq!(chosen.id.as_str(), "TASK-B");
    }

    #[test]
    fn blocked_unblocker_halts_the_workflow() {
        let mut unblocker = mk_task("TASK-U", "blocked", "P1", true, &[]);
        unblocker.blocked_reason = Some("need API".to_string());
        let tasks = vec![unblocker, mk_task("TASK-B", "todo", "P0", false, &[])];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);

        let err = picker.pick_next(&completed(&tasks), None).unwrap_err();
        match &err {
            WorkflowError::Halt { task_ids, reason } => {
                assert_eq!(task_ids, &vec![TaskId::from("TASK-U")]);
                assert!(reason.contains("need API"));
            }
            other => panic!("expected halt, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn halt_fires_even_with_status_filter() {
        let tasks = vec![
            mk_task("TASK-U", "blocked", "P1", true, &[]),
            mk_task("TASK-B", "todo", "P0", false, &[]),
        ];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);
        assert!(picker
            .pick_next(&completed(&tasks), Some("todo"))
            .is_err());
    }

    #[test]
    fn order_breaks_ties_before_id() {
        let mut first = mk_task("TASK-Z", "todo", "P1", false, &[]);
        first.order = Some(1);
        let mut second = mk_task("TASK-A", "todo", "P1", false, &[]);
        second.order = Some(2);
        let tasks = vec![first, second];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);

        let (chosen, _) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
        assert_eq!(chosen.id.as_str(), "TASK-Z");
    }

    #[test]
    fn unknown_status_sorts_last_without_failing() {
        let tasks = vec![
            mk_task("TASK-A", "someday", "P0", false, &[]),
            mk_task("TASK-B", "todo", "P2", false, &[]),
        ];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);
        let listed = picker.list_tasks(None, false);
        assert_eq!(listed[0].id.as_str(), "TASK-B");
        assert_eq!(listed[1].id.as_str(), "TASK-A");
    }

    #[test]
    fn list_includes_completed_and_filters() {
        let tasks = vec![
            mk_task("TASK-A", "completed", "P0", false, &[]),
            mk_task("TASK-B", "todo", "P0", false, &[]),
            mk_task("TASK-U", "todo", "P2", true, &[]),
        ];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);

        assert_eq!(picker.list_tasks(None, false).len(), 3);
        assert_eq!(picker.list_tasks(Some("todo"), false).len(), 2);
        let unblockers = picker.list_tasks(None, true);
        assert_eq!(unblockers.len(), 1);
        assert_eq!(unblockers[0].id.as_str(), "TASK-U");
    }

    #[test]
    fn listing_is_stable_across_calls() {
        let tasks = vec![
            mk_task("TASK-C", "todo", "P1", false, &[]),
            mk_task("TASK-A", "in_progress", "P2", false, &[]),
            mk_task("TASK-B", "blocked", "P2", false, &[]),
        ];
        let graph = DependencyGraph::new(tasks.clone());
        let picker = TaskPicker::new(&tasks, &graph);
        let first: Vec<String> = picker
            .list_tasks(None, false)
            .iter()
            .map(|t| t.id.0.clone())
            .collect();
        let second: Vec<String> = picker
            .list_tasks(None, false)
            .iter()
            .map(|t| t.id.0.clone())
            .collect();
        assert_eq!(first, second);
        // blocked surfaces first, then in_progress, then todo
        assert_eq!(first, vec!["TASK-B", "TASK-A", "TASK-C"]);
    }
}
