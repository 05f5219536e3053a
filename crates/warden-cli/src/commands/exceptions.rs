//! Exception ledger commands.

use serde_json::json;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::ledger;

use crate::output::{success_envelope, OutputChannel};

pub fn cmd_add_exception(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    exception_type: &str,
    parse_error: Option<String>,
) -> Result<(), WorkflowError> {
    ledger::add_exception(layout, task_id, exception_type, parse_error)?;
    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "exception_type": exception_type,
            "task_id": task_id,
        })));
    } else {
        output.emit_text(&format!(
            "Recorded {exception_type} exception for {task_id}"
        ));
    }
    Ok(())
}

pub fn cmd_resolve_exception(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    notes: Option<String>,
) -> Result<(), WorkflowError> {
    ledger::resolve_exception(layout, task_id, notes)?;
    if output.json_mode() {
        output.emit_json(&success_envelope(json!({ "task_id": task_id })));
    } else {
        output.emit_text(&format!("Resolved exception for {task_id}"));
    }
    Ok(())
}

pub fn cmd_cleanup_exception(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    trigger: &str,
) -> Result<(), WorkflowError> {
    let removed = ledger::cleanup_exception(layout, task_id, trigger)?;
    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "removed": removed,
            "task_id": task_id,
            "trigger": trigger,
        })));
    } else {
        output.emit_text(&format!("Removed {removed} exception entr(ies) for {task_id}"));
    }
    Ok(())
}

pub fn cmd_list_exceptions(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    status_filter: Option<&str>,
) -> Result<(), WorkflowError> {
    let entries = ledger::list_exceptions(layout, status_filter)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "count": entries.len(),
            "exceptions": serde_json::to_value(&entries)?,
        })));
    } else if entries.is_empty() {
        output.emit_text("No exception ledger entries");
    } else {
        for entry in &entries {
            output.emit_text(&format!(
                "{}\t{}\t{}\tdeadline={}",
                entry.task_id,
                entry.exception_type,
                entry.remediation.status,
                entry.remediation.deadline
            ));
        }
    }
    Ok(())
}
