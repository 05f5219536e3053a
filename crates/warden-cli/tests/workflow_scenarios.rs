//! End-to-end scenarios over a real task tree: discovery through the
//! datastore, graph validation, and picker selection.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use warden_cli::graph::DependencyGraph;
use warden_cli::operations::TaskOperations;
use warden_cli::picker::{check_halt_conditions, TaskPicker};
use warden_core::types::{Task, TaskId};
use warden_core::{RepoLayout, WorkflowError};
use warden_store::Datastore;

fn setup() -> (tempfile::TempDir, RepoLayout) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("tasks/backend")).unwrap();
    fs::create_dir_all(dir.path().join("docs/completed-tasks")).unwrap();
    let layout = RepoLayout::new(dir.path());
    (dir, layout)
}

fn write_task(root: &Path, rel: &str, body: &str) {
    fs::write(root.join(rel), body).unwrap();
}

fn load(layout: &RepoLayout) -> (Vec<Task>, DependencyGraph) {
    let tasks = Datastore::new(layout.clone()).load_tasks(true).unwrap();
    let graph = DependencyGraph::new(tasks.clone());
    (tasks, graph)
}

fn completed(tasks: &[Task]) -> BTreeSet<TaskId> {
    tasks
        .iter()
        .filter(|t| t.is_completed())
        .map(|t| t.id.clone())
        .collect()
}

#[test]
fn unblocker_is_picked_before_higher_priority_work() {
    let (_dir, layout) = setup();
    write_task(
        &layout.repo_root,
        "tasks/backend/a.task.yaml",
        "id: TASK-A\ntitle: Unblocker\nstatus: todo\npriority: P2\narea: backend\nunblocker: true\n",
    );
    write_task(
        &layout.repo_root,
        "tasks/backend/b.task.yaml",
        "id: TASK-B\ntitle: Urgent\nstatus: todo\npriority: P0\narea: backend\n",
    );
    write_task(
        &layout.repo_root,
        "tasks/backend/c.task.yaml",
        "id: TASK-C\ntitle: Follow-up\nstatus: todo\npriority: P0\narea: backend\nblocked_by: [TASK-A]\n",
    );

    let (tasks, graph) = load(&layout);
    let picker = TaskPicker::new(&tasks, &graph);
    let (chosen, _) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
    assert_eq!(chosen.id.as_str(), "TASK-A");

    // Complete A on disk and re-load: B wins the lexicographic tiebreak.
    let ops = TaskOperations::new(layout.clone());
    let task_a = tasks.iter().find(|t| t.id.as_str() == "TASK-A").unwrap();
    ops.complete_task(task_a, true).unwrap();

    let (tasks, graph) = load(&layout);
    let picker = TaskPicker::new(&tasks, &graph);
    let (chosen, _) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
    assert_eq!(chosen.id.as_str(), "TASK-B");
}

#[test]
fn cycle_is_reported_with_every_participant() {
    let (_dir, layout) = setup();
    write_task(
        &layout.repo_root,
        "tasks/backend/a.task.yaml",
        "id: TASK-A\ntitle: a\nstatus: todo\npriority: P1\narea: backend\nblocked_by: [TASK-B]\n",
    );
    write_task(
        &layout.repo_root,
        "tasks/backend/b.task.yaml",
        "id: TASK-B\ntitle: b\nstatus: todo\npriority: P1\narea: backend\nblocked_by: [TASK-C]\n",
    );
    write_task(
        &layout.repo_root,
        "tasks/backend/c.task.yaml",
        "id: TASK-C\ntitle: c\nstatus: todo\npriority: P1\narea: backend\nblocked_by: [TASK-A]\n",
    );

    let (_tasks, graph) = load(&layout);
    let (ok, errors) = graph.validate();
    assert!(!ok);
    let cycle = errors
        .iter()
        .find(|e| e.contains("Circular dependency"))
        .unwrap();
    for id in ["TASK-A", "TASK-B", "TASK-C"] {
        assert!(cycle.contains(id), "cycle error missing {id}: {cycle}");
    }
}

#[test]
fn archived_completed_tasks_satisfy_references() {
    let (_dir, layout) = setup();
    write_task(
        &layout.repo_root,
        "tasks/backend/new.task.yaml",
        "id: TASK-NEW\ntitle: new\nstatus: todo\npriority: P1\narea: backend\nblocked_by: [TASK-OLD]\n",
    );
    write_task(
        &layout.repo_root,
        "docs/completed-tasks/old.task.yaml",
        "id: TASK-OLD\ntitle: old\nstatus: completed\npriority: P1\narea: backend\n",
    );

    let (tasks, graph) = load(&layout);
    assert!(graph.missing_dependencies().is_empty());

    let picker = TaskPicker::new(&tasks, &graph);
    let (chosen, _) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
    assert_eq!(chosen.id.as_str(), "TASK-NEW");
}

#[test]
fn blocked_unblocker_halts_with_exit_code_two() {
    let (_dir, layout) = setup();
    write_task(
        &layout.repo_root,
        "tasks/backend/u.task.yaml",
        "id: TASK-U\ntitle: u\nstatus: blocked\npriority: P1\narea: backend\nunblocker: true\nblocked_reason: need API\n",
    );

    let (tasks, _graph) = load(&layout);
    let err = check_halt_conditions(&tasks).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    match err {
        WorkflowError::Halt { task_ids, reason } => {
            assert_eq!(task_ids, vec![TaskId::from("TASK-U")]);
            assert!(reason.contains("need API"));
        }
        other => panic!("expected halt, got {other:?}"),
    }
}

#[test]
fn pick_is_deterministic_across_runs() {
    let (_dir, layout) = setup();
    for id in ["TASK-D", "TASK-B", "TASK-C", "TASK-A"] {
        write_task(
            &layout.repo_root,
            &format!("tasks/backend/{id}.task.yaml"),
            &format!("id: {id}\ntitle: {id}\nstatus: todo\npriority: P1\narea: backend\n"),
        );
    }

    let mut picks = Vec::new();
    for _ in 0..3 {
        let (tasks, graph) = load(&layout);
        let picker = TaskPicker::new(&tasks, &graph);
        let (chosen, _) = picker.pick_next(&completed(&tasks), None).unwrap().unwrap();
        picks.push(chosen.id.0.clone());

        let listed: Vec<String> = picker
            .list_tasks(None, false)
            .iter()
            .map(|t| t.id.0.clone())
            .collect();
        assert_eq!(listed, vec!["TASK-A", "TASK-B", "TASK-C", "TASK-D"]);
    }
    assert!(picks.iter().all(|id| id == "TASK-A"));
}

#[test]
fn completing_a_task_updates_cache_and_archive() {
    let (_dir, layout) = setup();
    write_task(
        &layout.repo_root,
        "tasks/backend/a.task.yaml",
        "id: TASK-A\ntitle: a\nstatus: in_progress\npriority: P1\narea: backend\n",
    );

    let (tasks, _graph) = load(&layout);
    let ops = TaskOperations::new(layout.clone());
    ops.complete_task(&tasks[0], true).unwrap();

    let (tasks, _graph) = load(&layout);
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].is_completed());
    assert!(tasks[0].in_archive());

    let info = Datastore::new(layout.clone()).cache_info();
    assert_eq!(info.archive_count, 1);
}
