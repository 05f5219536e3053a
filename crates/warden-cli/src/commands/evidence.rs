//! Evidence and standards-excerpt commands.

use std::path::Path;

use serde_json::json;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::ContextStore;

use crate::output::{success_envelope, OutputChannel};

pub fn cmd_attach_evidence(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    artifact_type: &str,
    artifact_path: &Path,
    description: Option<String>,
    metadata: Option<String>,
) -> Result<(), WorkflowError> {
    let metadata = metadata
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|err| {
                WorkflowError::validation(format!("failed to parse --metadata JSON: {err}"))
            })
        })
        .transpose()?;

    let store = ContextStore::new(layout.clone());
    let attachment =
        store.attach_evidence(task_id, artifact_path, artifact_type, description, None, metadata)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(serde_json::to_value(&attachment)?));
    } else {
        output.emit_text(&format!("Evidence attached: {}", attachment.id));
        output.emit_text(&format!("  Type: {}", attachment.kind));
        output.emit_text(&format!("  Path: {}", attachment.path));
        if attachment.compression.is_some() {
            output.emit_text("  Stored compressed (tar.gz)");
        }
    }
    Ok(())
}

pub fn cmd_list_evidence(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let attachments = store.list_evidence(task_id)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(json!({
            "count": attachments.len(),
            "evidence": serde_json::to_value(&attachments)?,
        })));
    } else if attachments.is_empty() {
        output.emit_text("No evidence attachments found");
    } else {
        output.emit_text(&format!("Evidence attachments for {task_id}:"));
        for attachment in &attachments {
            output.emit_text(&format!(
                "  - {}: {} - {}",
                attachment.id,
                attachment.kind,
                attachment.description.as_deref().unwrap_or("(no description)")
            ));
        }
    }
    Ok(())
}

pub fn cmd_attach_standard(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
    file: &str,
    section: &str,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let excerpt = store.extract_standards_excerpt(task_id, file, section)?;

    if output.json_mode() {
        output.emit_json(&success_envelope(serde_json::to_value(&excerpt)?));
    } else {
        output.emit_text(&format!("Standards excerpt attached: {}", excerpt.excerpt_id));
        output.emit_text(&format!("  File: {}", excerpt.file));
        output.emit_text(&format!("  Section: {}", excerpt.section));
        output.emit_text(&format!(
            "  Lines: {}-{}",
            excerpt.line_span.0, excerpt.line_span.1
        ));
    }
    Ok(())
}
