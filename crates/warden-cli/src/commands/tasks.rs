//! Task graph commands: list, pick, validate, check-halt, graph, explain,
//! cache maintenance, and the claim/complete/archive transitions.

use std::path::Path;

use serde_json::json;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::Datastore;

use crate::commands::{task_to_json, World};
use crate::operations::TaskOperations;
use crate::output::{success_envelope, OutputChannel};
use crate::picker::{check_halt_conditions, TaskPicker};

pub fn cmd_list(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    filter: Option<&str>,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;

    let (status_filter, unblocker_only) = match filter {
        Some("unblocker") => (None, true),
        Some(status) => (Some(status), false),
        None => (None, false),
    };

    let picker = TaskPicker::new(&world.tasks, &world.graph);
    let tasks = picker.list_tasks(status_filter, unblocker_only);

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "count": tasks.len(),
            "filter": {
                "status": status_filter,
                "unblocker_only": unblocker_only,
            },
            "tasks": tasks.iter().map(task_to_json).collect::<Vec<_>>(),
        })));
    } else {
        for task in &tasks {
            output.emit_text(&format!(
                "{}\t{}\t{}\t{}",
                task.id,
                task.status,
                task.path.display(),
                task.title
            ));
        }
    }
    Ok(())
}

pub fn cmd_pick(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    filter: Option<&str>,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let status_filter = filter.filter(|f| *f != "auto");

    let picker = TaskPicker::new(&world.tasks, &world.graph);
    let picked = picker.pick_next(&world.completed_ids(), status_filter)?;

    match picked {
        Some((task, reason)) => {
            let snapshot_id = Datastore::new(layout.clone()).next_snapshot_id()?;
            if output.json_mode() {
                output.emit_json(&success_envelope(json!({
                    "reason": reason,
                    "snapshot_id": snapshot_id,
                    "task": task_to_json(&task),
                })));
            } else {
                output.emit_text(&task.path.display().to_string());
            }
            Ok(())
        }
        None => Err(WorkflowError::general("no ready tasks found")),
    }
}

pub fn cmd_validate(layout: &RepoLayout, output: &mut OutputChannel) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let (ok, errors) = world.graph.validate();

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "error_count": errors.len(),
            "errors": errors,
            "valid": ok,
        })));
    } else if ok {
        output.emit_text("Validation passed: no dependency errors found");
    } else {
        for error in &errors {
            output.warn(format!("validation: {error}"));
        }
    }

    if ok {
        Ok(())
    } else {
        Err(WorkflowError::validation(format!(
            "dependency validation failed with {} error(s)",
            errors.len()
        )))
    }
}

pub fn cmd_check_halt(
    layout: &RepoLayout,
    output: &mut OutputChannel,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    match check_halt_conditions(&world.tasks) {
        Ok(()) => {
            if output.json_mode() {
                output.emit_json(&success_envelope(json!({
                    "halt": false,
                    "message": "No halt conditions detected",
                    "tasks": [],
                })));
            } else {
                output.emit_text("No halt conditions detected - workflow can proceed");
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

pub fn cmd_graph(layout: &RepoLayout, output: &mut OutputChannel) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let dot = world.graph.export_dot();

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({ "dot": dot })));
    } else {
        output.emit_text(&dot);
        eprintln!("\n# Render with: dot -Tpng -o tasks.png");
    }
    Ok(())
}

pub fn cmd_explain(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let task = world
        .find_by_id(task_id)
        .cloned()
        .ok_or_else(|| WorkflowError::io(format!("task not found: {task_id}")))?;

    let closure = world.graph.dependency_closure(task_id);
    let downstream = world.graph.find_transitively_blocked(task_id);
    let completed = world.completed_ids();
    let ready = task.is_ready(&completed);
    let blocking_count = task
        .blocked_by
        .iter()
        .filter(|dep| !completed.contains(dep))
        .count();

    if output.json_mode() {
        let blockers: Vec<_> = task
            .blocked_by
            .iter()
            .map(|dep| match world.graph.task_by_id.get(dep) {
                Some(dep_task) => json!({
                    "blocking": !completed.contains(dep),
                    "id": dep,
                    "status": dep_task.status,
                    "title": dep_task.title,
                }),
                None => json!({
                    "blocking": true,
                    "id": dep,
                    "status": "unknown",
                    "title": null,
                }),
            })
            .collect();

        let artifacts: Vec<_> = task
            .depends_on
            .iter()
            .map(|dep| match world.graph.task_by_id.get(dep) {
                Some(dep_task) => json!({
                    "available": completed.contains(dep),
                    "id": dep,
                    "status": dep_task.status,
                    "title": dep_task.title,
                }),
                None => json!({
                    "available": false,
                    "id": dep,
                    "status": "unknown",
                    "title": null,
                }),
            })
            .collect();

        output.emit_json(&success_envelope(json!({
            "artifact_dependencies": artifacts,
            "downstream_blocked": downstream
                .iter()
                .map(|t| t.id.as_str())
                .collect::<Vec<_>>(),
            "hard_blockers": blockers,
            "readiness": {
                "blocking_count": blocking_count,
                "ready": ready,
                "recommendation": if ready {
                    "Task is ready to start".to_string()
                } else {
                    format!("Complete {blocking_count} hard blocker(s) first")
                },
            },
            "task": task_to_json(&task),
            "transitive_closure": closure
                .transitive
                .iter()
                .map(TaskId::as_str)
                .collect::<Vec<_>>(),
        })));
        return Ok(());
    }

    output.emit_text(&format!("{}: {}", task.id, task.title));
    output.emit_text(&format!("  Status: {}", task.status));
    output.emit_text(&format!("  Priority: {}", task.priority));
    if task.unblocker {
        output.emit_text("  Unblocker: YES");
    }
    output.emit_text("");

    if task.blocked_by.is_empty() {
        output.emit_text("  Hard blockers (blocked_by): none");
    } else {
        output.emit_text("  Hard blockers (blocked_by):");
        for dep in &task.blocked_by {
            match world.graph.task_by_id.get(dep) {
                Some(dep_task) => {
                    let marker = if completed.contains(dep) {
                        "[COMPLETED]"
                    } else {
                        "[BLOCKING]"
                    };
                    output.emit_text(&format!(
                        "    -> {dep} (status: {}) - {} {marker}",
                        dep_task.status, dep_task.title
                    ));
                }
                None => output.emit_text(&format!("    -> {dep} (MISSING) [BLOCKING]")),
            }
        }
    }
    output.emit_text("");

    if task.depends_on.is_empty() {
        output.emit_text("  Artifact dependencies (depends_on): none");
    } else {
        output.emit_text("  Artifact dependencies (depends_on):");
        for dep in &task.depends_on {
            match world.graph.task_by_id.get(dep) {
                Some(dep_task) => {
                    let marker = if completed.contains(dep) {
                        "[AVAILABLE]"
                    } else {
                        "[IN PROGRESS]"
                    };
                    output.emit_text(&format!(
                        "    -> {dep} (status: {}) - {} {marker}",
                        dep_task.status, dep_task.title
                    ));
                }
                None => output.emit_text(&format!("    -> {dep} (MISSING) [UNAVAILABLE]")),
            }
        }
    }
    output.emit_text("");

    if !closure.transitive.is_empty() {
        let chain: Vec<&str> = closure.transitive.iter().map(TaskId::as_str).collect();
        output.emit_text(&format!("  Transitive chain: {}", chain.join(" -> ")));
        output.emit_text("");
    }

    if !downstream.is_empty() {
        let ids: Vec<&str> = downstream.iter().map(|t| t.id.as_str()).collect();
        output.emit_text(&format!(
            "  Blocks downstream: {} task(s): {}",
            ids.len(),
            ids.join(", ")
        ));
        output.emit_text("");
    }

    if ready {
        output.emit_text("  Readiness: READY");
    } else {
        output.emit_text(&format!(
            "  Readiness: NOT READY ({blocking_count} hard blocker(s) remain)"
        ));
        let incomplete: Vec<&str> = task
            .blocked_by
            .iter()
            .filter(|dep| !completed.contains(dep))
            .map(TaskId::as_str)
            .collect();
        if !incomplete.is_empty() {
            output.emit_text(&format!(
                "  Recommendation: complete these tasks first: {}",
                incomplete.join(", ")
            ));
        }
    }
    Ok(())
}

pub fn cmd_refresh_cache(
    layout: &RepoLayout,
    output: &mut OutputChannel,
) -> Result<(), WorkflowError> {
    let datastore = Datastore::new(layout.clone());
    let tasks = datastore.load_tasks(true)?;
    let info = datastore.cache_info();

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "archive_count": info.archive_count,
            "generated_at": info.generated_at,
            "task_count": tasks.len(),
        })));
    } else {
        output.emit_text(&format!("Cache refreshed: {} tasks loaded", tasks.len()));
        if let Some(generated_at) = &info.generated_at {
            output.emit_text(&format!("Cache generated at: {generated_at}"));
        }
        output.emit_text(&format!(
            "Active tasks: {}",
            info.task_count - info.archive_count
        ));
        output.emit_text(&format!("Archived tasks: {}", info.archive_count));
    }
    Ok(())
}

pub fn cmd_cache_info(
    layout: &RepoLayout,
    output: &mut OutputChannel,
) -> Result<(), WorkflowError> {
    let info = Datastore::new(layout.clone()).cache_info();
    if output.json_mode() {
        output.emit_json(&success_envelope(serde_json::to_value(&info)?));
    } else if info.exists {
        output.emit_text(&format!(
            "Cache: version={} tasks={} archived={} generated_at={}",
            info.version.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string()),
            info.task_count,
            info.archive_count,
            info.generated_at.as_deref().unwrap_or("?"),
        ));
    } else {
        output.emit_text("Cache: not built yet (run refresh-cache)");
    }
    Ok(())
}

pub fn cmd_claim(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_path: &Path,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let task = world
        .find_by_path(task_path)
        .cloned()
        .ok_or_else(|| WorkflowError::io(format!("task not found: {}", task_path.display())))?;

    let ops = TaskOperations::new(layout.clone());
    let result_path = ops.claim_task(&task)?;
    Datastore::new(layout.clone()).load_tasks(true)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "from_status": task.status,
            "path": result_path,
            "task_id": task.id,
            "to_status": "in_progress",
        })));
    } else {
        output.emit_text(&format!("Claimed task {}", task.id));
        output.emit_text(&format!("  Status: {} -> in_progress", task.status));
        output.emit_text(&format!("  File: {}", result_path.display()));
    }
    Ok(())
}

pub fn cmd_complete(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_path: &Path,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let task = world
        .find_by_path(task_path)
        .cloned()
        .ok_or_else(|| WorkflowError::io(format!("task not found: {}", task_path.display())))?;

    let ops = TaskOperations::new(layout.clone());
    let result_path = ops.complete_task(&task, true)?;

    // The entry auto-removes on completion; stale tasks would otherwise
    // keep their suppressed warnings forever.
    let _ = warden_store::ledger::cleanup_exception(layout, &task.id, "task_completion");
    Datastore::new(layout.clone()).load_tasks(true)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "archived_to": result_path,
            "from_status": task.status,
            "task_id": task.id,
            "to_status": "completed",
        })));
    } else {
        output.emit_text(&format!("Completed task {}", task.id));
        output.emit_text(&format!("  Status: {} -> completed", task.status));
        output.emit_text(&format!("  Archived to: {}", result_path.display()));
    }
    Ok(())
}

pub fn cmd_archive(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_path: &Path,
) -> Result<(), WorkflowError> {
    let world = World::load(layout, false)?;
    let task = world
        .find_by_path(task_path)
        .cloned()
        .ok_or_else(|| WorkflowError::io(format!("task not found: {}", task_path.display())))?;

    let ops = TaskOperations::new(layout.clone());
    let result_path = ops.archive_task(&task)?;
    Datastore::new(layout.clone()).load_tasks(true)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "archived_to": result_path,
            "task_id": task.id,
        })));
    } else {
        output.emit_text(&format!("Archived task {}", task.id));
        output.emit_text(&format!("  File: {}", result_path.display()));
    }
    Ok(())
}
