//! Quarantine commands.

use serde_json::json;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::quarantine;

use crate::output::{success_envelope, OutputChannel};

pub fn cmd_quarantine_task(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    reason: &str,
    error_details: Option<String>,
) -> Result<(), WorkflowError> {
    let entry = quarantine::quarantine_task(layout, task_id, reason, error_details)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(serde_json::to_value(&entry)?));
    } else {
        output.emit_text(&format!("Quarantined {task_id} ({reason})"));
        output.emit_text(&format!("  Entry: docs/compliance/quarantine/{task_id}.quarantine.json"));
    }
    Ok(())
}

pub fn cmd_release_quarantine(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    quarantine::release_from_quarantine(layout, task_id)?;
    if output.json_mode() {
        output.emit_json(&success_envelope(json!({ "task_id": task_id })));
    } else {
        output.emit_text(&format!("Released {task_id} from quarantine"));
    }
    Ok(())
}

pub fn cmd_list_quarantined(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    status_filter: Option<&str>,
) -> Result<(), WorkflowError> {
    let entries = quarantine::list_quarantined(layout, status_filter)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "count": entries.len(),
            "quarantined": serde_json::to_value(&entries)?,
        })));
    } else if entries.is_empty() {
        output.emit_text("No quarantined tasks");
    } else {
        for entry in &entries {
            output.emit_text(&format!(
                "{}\t{}\t{}\tquarantined_at={}",
                entry.task_id, entry.reason, entry.repair_status, entry.quarantined_at
            ));
        }
    }
    Ok(())
}
