//! Worktree snapshot and drift verification commands.

use serde_json::json;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_git::{repo, GitCli};
use warden_store::context::models::AgentRole;
use warden_store::ContextStore;

use crate::output::{success_envelope, OutputChannel};

pub fn cmd_snapshot_worktree(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    agent: AgentRole,
    actor: &str,
    base_commit: Option<String>,
    previous_agent: Option<AgentRole>,
) -> Result<(), WorkflowError> {
    let base_commit = match base_commit {
        Some(commit) => commit,
        None => repo::head_sha(&layout.repo_root, &GitCli::default())?,
    };

    let store = ContextStore::new(layout.clone());
    let snapshot = store.snapshot_worktree(task_id, agent, actor, &base_commit, previous_agent)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "agent_role": agent,
            "snapshot": serde_json::to_value(&snapshot)?,
            "task_id": task_id,
        })));
    } else {
        output.emit_text(&format!("Captured {agent} worktree snapshot for {task_id}"));
        output.emit_text(&format!(
            "  Base commit: {}",
            &snapshot.base_commit[..8.min(snapshot.base_commit.len())]
        ));
        output.emit_text(&format!("  Files changed: {}", snapshot.files_changed.len()));
        output.emit_text(&format!("  Diff SHA: {}", &snapshot.diff_sha[..8]));
        if let Some(error) = &snapshot.incremental_diff_error {
            output.warn(format!("incremental diff unavailable: {error}"));
        }
    }
    Ok(())
}

pub fn cmd_verify_worktree(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    expected_agent: AgentRole,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    store.verify_worktree_state(task_id, expected_agent)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "drift_detected": false,
            "expected_agent": expected_agent,
            "task_id": task_id,
        })));
    } else {
        output.emit_text(&format!(
            "Working tree verified against {expected_agent} snapshot for {task_id}"
        ));
        output.emit_text("  No drift detected");
    }
    Ok(())
}
