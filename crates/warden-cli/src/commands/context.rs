//! Context lifecycle commands: init, get, purge, rebuild, update-agent,
//! plus the `context info/validate/migrate` inspection group.

use chrono::{DateTime, Utc};
use serde_json::json;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::context::immutable::ImmutableBuilder;
use warden_store::context::models::{AgentRole, CoordinationUpdate};
use warden_store::{ledger, quarantine, ContextStore};

use crate::output::{success_envelope, OutputChannel};

pub fn cmd_init_context(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    base_commit: Option<String>,
    actor: &str,
    force_secrets: bool,
) -> Result<(), WorkflowError> {
    if quarantine::is_quarantined(layout, task_id)? {
        return Err(WorkflowError::blocker(format!(
            "task {task_id} is quarantined; release it or fix the underlying issues first"
        )));
    }

    // Diffs taken later assume the snapshot base is clean; the task's own
    // context directory is expected to change.
    if !force_secrets {
        if let Ok((clean, dirty)) = warden_git::repo::check_dirty_tree(
            &layout.repo_root,
            &warden_git::GitCli::default(),
            false,
            &[format!(".agent-output/{task_id}/")],
        ) {
            if !clean {
                output.warn(format!(
                    "working tree has uncommitted changes ({} file(s), e.g. {}); \
                     diffs may include them",
                    dirty.len(),
                    dirty.first().map(String::as_str).unwrap_or("?")
                ));
            }
        }
    }

    let store = ContextStore::new(layout.clone());
    let task_path = store
        .resolve_task_path(task_id)?
        .ok_or_else(|| WorkflowError::io(format!("task file not found for {task_id}")))?;

    let context = match store.init_from_task(task_id, &task_path, actor, force_secrets, base_commit)
    {
        Ok(context) => context,
        Err(err) => {
            // Schema gaps land in the exception ledger so repeated runs
            // stay quiet until someone fixes the task file.
            if let WorkflowError::Validation { message } = &err {
                if message.contains("required task fields are empty") {
                    let _ = ledger::add_exception(
                        layout,
                        task_id,
                        "invalid_schema",
                        Some(message.clone()),
                    );
                }
            }
            return Err(err);
        }
    };

    let manifest = store.get_manifest(task_id)?;
    let source_count = manifest.map(|m| m.source_files.len()).unwrap_or(0);

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "base_commit": context.git_head,
            "context_version": context.version,
            "source_files_count": source_count,
            "task_id": task_id,
        })));
    } else {
        output.emit_text(&format!("Initialized context for {task_id}"));
        output.emit_text(&format!("  Base commit: {}", &context.git_head[..8.min(context.git_head.len())]));
        output.emit_text(&format!("  Context file: .agent-output/{task_id}/context.json"));
        output.emit_text(&format!(
            "  Manifest file: .agent-output/{task_id}/context.manifest ({source_count} sources)"
        ));
    }
    Ok(())
}

pub fn cmd_get_context(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let context = store
        .get_context(task_id)?
        .ok_or_else(|| WorkflowError::io(format!("no context found for {task_id}")))?;

    let warnings = store.staleness_warnings(&context);
    for warning in &warnings {
        output.warn(warning.clone());
    }

    let age_hours = DateTime::parse_from_rfc3339(&context.created_at)
        .map(|created| {
            Utc::now()
                .signed_duration_since(created.with_timezone(&Utc))
                .num_minutes() as f64
                / 60.0
        })
        .unwrap_or(0.0);

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "age_hours": (age_hours * 10.0).round() / 10.0,
            "context": serde_json::to_value(&context)?,
            "staleness_warnings": warnings,
        })));
    } else {
        output.emit_text(&format!("Context for {}", context.task_id));
        output.emit_text(&format!("  Version: {}", context.version));
        output.emit_text(&format!("  Created: {}", context.created_at));
        output.emit_text(&format!("  Created by: {}", context.created_by));
        output.emit_text(&format!(
            "  Git HEAD: {}",
            &context.git_head[..8.min(context.git_head.len())]
        ));
        output.emit_text(&format!("  Age: {age_hours:.1} hours"));
        output.emit_text("");
        output.emit_text("Task snapshot:");
        output.emit_text(&format!("  Title: {}", context.immutable.task_snapshot.title));
        output.emit_text(&format!(
            "  Priority: {}",
            context.immutable.task_snapshot.priority
        ));
        output.emit_text(&format!("  Area: {}", context.immutable.task_snapshot.area));
        output.emit_text("");
        output.emit_text("Agent coordination:");
        output.emit_text(&format!("  Implementer: {}", context.implementer.status));
        output.emit_text(&format!("  Reviewer: {}", context.reviewer.status));
        output.emit_text(&format!("  Validator: {}", context.validator.status));
    }
    Ok(())
}

pub fn cmd_purge_context(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    ContextStore::new(layout.clone()).purge_context(task_id)?;
    if output.json_mode() {
        output.emit_json(&success_envelope(json!({ "task_id": task_id })));
    } else {
        output.emit_text(&format!("Purged context for {task_id}"));
    }
    Ok(())
}

pub fn cmd_rebuild_context(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    actor: &str,
    force_secrets: bool,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let context = store.rebuild_context(task_id, actor, force_secrets)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "git_head": context.git_head,
            "task_id": task_id,
        })));
    } else {
        output.emit_text(&format!("Rebuilt context for {task_id}"));
        output.emit_text(&format!(
            "  Git HEAD: {}",
            &context.git_head[..8.min(context.git_head.len())]
        ));
        output.emit_text(&format!("  Context file: .agent-output/{task_id}/context.json"));
    }
    Ok(())
}

pub struct UpdateAgentArgs {
    pub task_id: TaskId,
    pub agent: AgentRole,
    pub status: Option<String>,
    pub qa_log: Option<String>,
    pub session_id: Option<String>,
    pub actor: String,
    pub force_secrets: bool,
}

pub fn cmd_update_agent(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    args: UpdateAgentArgs,
) -> Result<(), WorkflowError> {
    let mut update = CoordinationUpdate {
        status: args.status,
        session_id: args.session_id,
        qa_log_path: args.qa_log,
        ..Default::default()
    };
    // Done agents get their hand-off timestamp stamped automatically.
    if update.status.as_deref() == Some("done") {
        update.completed_at = Some(Utc::now().to_rfc3339());
    }
    if update.is_empty() {
        return Err(WorkflowError::validation(
            "no updates specified (use --status, --qa-log, or --session-id)",
        ));
    }

    let store = ContextStore::new(layout.clone());
    store.update_coordination(
        &args.task_id,
        args.agent,
        &update,
        &args.actor,
        args.force_secrets,
    )?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "agent_role": args.agent,
            "task_id": args.task_id,
            "updates": serde_json::to_value(&update)?,
        })));
    } else {
        output.emit_text(&format!(
            "Updated {} coordination for {}",
            args.agent, args.task_id
        ));
    }
    Ok(())
}

pub fn cmd_context_info(
    layout: &RepoLayout,
    output: &mut OutputChannel,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let ids = store.discover_contexts();

    let mut entries = Vec::new();
    for id in &ids {
        if let Some(context) = store.get_context(id)? {
            entries.push(json!({
                "audit_update_count": context.audit_update_count,
                "created_at": context.created_at,
                "git_head": context.git_head,
                "task_id": id,
                "version": context.version,
            }));
        }
    }

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "contexts": entries,
            "count": ids.len(),
        })));
    } else if ids.is_empty() {
        output.emit_text("No initialized contexts");
    } else {
        output.emit_text(&format!("{} initialized context(s):", ids.len()));
        for entry in &entries {
            output.emit_text(&format!(
                "  {} v{} created {} ({} update(s))",
                entry["task_id"].as_str().unwrap_or("?"),
                entry["version"],
                entry["created_at"].as_str().unwrap_or("?"),
                entry["audit_update_count"],
            ));
        }
    }
    Ok(())
}

pub fn cmd_context_validate(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: Option<&TaskId>,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let ids = match task_id {
        Some(id) => vec![id.clone()],
        None => store.discover_contexts(),
    };

    let builder = ImmutableBuilder::new(layout);
    let mut reports = Vec::new();
    let mut failures = 0usize;

    for id in &ids {
        let mut problems: Vec<String> = Vec::new();

        match store.get_context(id) {
            Ok(Some(_)) => {}
            Ok(None) => problems.push("context.json missing".to_string()),
            Err(err) => problems.push(format!("context.json invalid: {err}")),
        }

        match builder.read_manifest(id) {
            Ok(Some(manifest)) => {
                problems.extend(builder.detect_source_changes(&manifest));
            }
            Ok(None) => problems.push("context.manifest missing".to_string()),
            Err(err) => problems.push(format!("context.manifest invalid: {err}")),
        }

        if !problems.is_empty() {
            failures += 1;
        }
        reports.push(json!({
            "problems": problems,
            "task_id": id,
        }));
    }

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "checked": ids.len(),
            "invalid": failures,
            "reports": reports,
        })));
    } else {
        for report in &reports {
            let id = report["task_id"].as_str().unwrap_or("?");
            let problems = report["problems"].as_array().cloned().unwrap_or_default();
            if problems.is_empty() {
                output.emit_text(&format!("{id}: ok"));
            } else {
                for problem in problems {
                    output.emit_text(&format!("{id}: {}", problem.as_str().unwrap_or("?")));
                }
            }
        }
    }

    if failures > 0 {
        Err(WorkflowError::validation(format!(
            "{failures} context(s) failed validation"
        )))
    } else {
        Ok(())
    }
}

pub fn cmd_context_migrate(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: Option<&TaskId>,
    auto: bool,
    dry_run: bool,
    force: bool,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let ids = match (task_id, auto) {
        (Some(id), _) => vec![id.clone()],
        (None, true) => store.discover_contexts(),
        (None, false) => {
            return Err(WorkflowError::validation(
                "must specify a task id or use --auto",
            ))
        }
    };

    let mut reports = Vec::new();
    for id in &ids {
        reports.push(store.migrate_context(id, dry_run, force)?);
    }

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "dry_run": dry_run,
            "results": serde_json::to_value(&reports)?,
            "total": reports.len(),
        })));
    } else {
        for report in &reports {
            if report.changes_applied.is_empty() {
                output.emit_text(&format!(
                    "Skipped: {} (already at version {})",
                    report.task_id, report.new_version
                ));
            } else {
                let verb = if dry_run { "Would migrate" } else { "Migrated" };
                output.emit_text(&format!("{verb}: {}", report.task_id));
                for change in &report.changes_applied {
                    output.emit_text(&format!("  - {change}"));
                }
            }
        }
    }
    Ok(())
}
