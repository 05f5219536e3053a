//! QA result recording.

use std::path::Path;

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_store::ContextStore;

use crate::output::{success_envelope, OutputChannel};

pub struct RecordQaArgs<'a> {
    pub task_id: TaskId,
    pub command: String,
    pub exit_code: i32,
    pub log_path: Option<&'a Path>,
    pub actor: String,
    pub duration_ms: Option<u64>,
}

pub fn cmd_record_qa(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    args: RecordQaArgs<'_>,
) -> Result<(), WorkflowError> {
    let store = ContextStore::new(layout.clone());
    let result = store.record_qa(
        &args.task_id,
        &args.command,
        args.exit_code,
        args.log_path,
        &args.actor,
        args.duration_ms,
    )?;

    if output.json_mode() {
        output.emit_json(&success_envelope(serde_json::to_value(&result)?));
    } else {
        output.emit_text(&format!("QA result recorded for {}", args.command));
        output.emit_text(&format!("  Command id: {}", result.command_id));
        output.emit_text(&format!("  Exit code: {}", result.exit_code));
        if let Some(log_path) = &result.log_path {
            output.emit_text(&format!("  Log attached: {log_path}"));
        }
        output.emit_text("  Stored in context validation_baseline.qa_results");
    }
    Ok(())
}

pub fn cmd_qa_drift(
    layout: &RepoLayout,
    output: &mut OutputChannel,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    use warden_store::context::qa::detect_qa_drift;

    let store = ContextStore::new(layout.clone());
    let context = store
        .get_context(task_id)?
        .ok_or_else(|| WorkflowError::io(format!("no context found for {task_id}")))?;

    let qa_results = context
        .immutable
        .validation_baseline
        .qa_results
        .as_ref()
        .ok_or_else(|| {
            WorkflowError::validation(format!("no QA results recorded for {task_id}"))
        })?;

    // The baseline is the first recorded run per command id; the current
    // set is the latest run per command id.
    let mut baseline = qa_results.clone();
    let mut current = qa_results.clone();
    baseline.results = {
        let mut seen = std::collections::BTreeSet::new();
        qa_results
            .results
            .iter()
            .filter(|r| seen.insert(r.command_id.clone()))
            .cloned()
            .collect()
    };
    current.results = {
        let mut latest = std::collections::BTreeMap::new();
        for result in &qa_results.results {
            latest.insert(result.command_id.clone(), result.clone());
        }
        latest.into_values().collect()
    };

    let report = detect_qa_drift(&baseline, &current);

    if output.json_mode() {
        output.emit_json(&success_envelope(serde_json::to_value(&report)?));
    } else if report.has_drift {
        output.emit_text(&format!(
            "QA drift detected: {} regression(s)",
            report.regressions.len()
        ));
        for finding in &report.regressions {
            output.emit_text(&format!(
                "  {}: {} ({} -> {})",
                finding.command_id, finding.kind, finding.baseline, finding.current
            ));
        }
    } else {
        output.emit_text("No QA drift against the recorded baseline");
        for finding in &report.improvements {
            output.emit_text(&format!(
                "  improved {}: {} ({} -> {})",
                finding.command_id, finding.kind, finding.baseline, finding.current
            ));
        }
    }

    if report.has_drift {
        Err(WorkflowError::drift(
            "QA results regressed against the baseline",
            report
                .regressions
                .iter()
                .map(|f| f.command_id.clone())
                .collect(),
        ))
    } else {
        Ok(())
    }
}
