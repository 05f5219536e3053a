//! Quarantine records for tasks with critical validation failures.
//!
//! Entries live at `docs/compliance/quarantine/<task>.quarantine.json`
//! with a fast-lookup `index.json`; releasing a task moves its entry to
//! `resolved/` and prunes the index.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};

use crate::json;
use crate::lock::{FileLock, LOCK_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuarantineEntry {
    pub task_id: TaskId,
    pub quarantined_at: String,
    /// malformed_yaml, validation_failed, corrupted_context, or manual.
    pub reason: String,
    pub original_path: String,
    #[serde(default)]
    pub error_details: Option<String>,
    #[serde(default)]
    pub auto_repair_attempted: bool,
    pub repair_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuarantineIndex {
    quarantined_tasks: Vec<String>,
}

pub const QUARANTINE_REASONS: [&str; 4] = [
    "malformed_yaml",
    "validation_failed",
    "corrupted_context",
    "manual",
];

/// Quarantine a task: write its entry file and add it to the index.
/// Re-quarantining an already-quarantined task is idempotent.
pub fn quarantine_task(
    layout: &RepoLayout,
    task_id: &TaskId,
    reason: &str,
    error_details: Option<String>,
) -> Result<QuarantineEntry, WorkflowError> {
    if !QUARANTINE_REASONS.contains(&reason) {
        return Err(WorkflowError::validation(format!(
            "invalid quarantine reason '{reason}'. valid values: {}",
            QUARANTINE_REASONS.join(", ")
        )));
    }

    std::fs::create_dir_all(layout.quarantine_dir())?;

    let entry = QuarantineEntry {
        task_id: task_id.clone(),
        quarantined_at: Utc::now().to_rfc3339(),
        reason: reason.to_string(),
        original_path: format!("tasks/{}.task.yaml", task_id.0),
        error_details,
        auto_repair_attempted: false,
        repair_status: "pending".to_string(),
    };
    json::write_sorted(&layout.quarantine_entry(task_id), &entry)?;

    let _lock = FileLock::acquire(&layout.quarantine_index_lock(), LOCK_TIMEOUT)?;
    let mut index = load_index(layout)?;
    if !index.quarantined_tasks.contains(&task_id.0) {
        index.quarantined_tasks.push(task_id.0.clone());
        index.quarantined_tasks.sort();
    }
    json::write_sorted(&layout.quarantine_index(), &index)?;

    Ok(entry)
}

/// Fast lookup via the index; individual entries are not read.
pub fn is_quarantined(layout: &RepoLayout, task_id: &TaskId) -> Result<bool, WorkflowError> {
    let path = layout.quarantine_index();
    if !path.exists() {
        return Ok(false);
    }
    let raw = std::fs::read_to_string(&path)?;
    let index: QuarantineIndex = serde_json::from_str(&raw)
        .map_err(|err| WorkflowError::validation(format!("invalid quarantine index: {err}")))?;
    Ok(index.quarantined_tasks.contains(&task_id.0))
}

/// Release a task: move its entry to `resolved/` and prune the index.
pub fn release_from_quarantine(
    layout: &RepoLayout,
    task_id: &TaskId,
) -> Result<(), WorkflowError> {
    let entry_path = layout.quarantine_entry(task_id);
    if !entry_path.exists() {
        return Err(WorkflowError::io(format!(
            "quarantine entry not found: {}",
            entry_path.display()
        )));
    }

    let resolved_dir = layout.quarantine_resolved_dir();
    std::fs::create_dir_all(&resolved_dir)?;
    let destination = resolved_dir.join(entry_path.file_name().unwrap_or_default());
    std::fs::rename(&entry_path, &destination)?;

    let _lock = FileLock::acquire(&layout.quarantine_index_lock(), LOCK_TIMEOUT)?;
    let mut index = load_index(layout)?;
    index.quarantined_tasks.retain(|id| id != &task_id.0);
    json::write_sorted(&layout.quarantine_index(), &index)?;

    Ok(())
}

/// All quarantine entries, optionally filtered by repair status.
pub fn list_quarantined(
    layout: &RepoLayout,
    status_filter: Option<&str>,
) -> Result<Vec<QuarantineEntry>, WorkflowError> {
    let dir = layout.quarantine_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for path in glob::glob(&format!("{}/*.quarantine.json", dir.display()))
        .map_err(|err| WorkflowError::general(format!("bad quarantine glob: {err}")))?
        .filter_map(Result::ok)
    {
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        // Skip corrupted entries rather than failing the listing.
        let Ok(entry) = serde_json::from_str::<QuarantineEntry>(&raw) else {
            continue;
        };
        if status_filter.is_none() || status_filter == Some(entry.repair_status.as_str()) {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    Ok(entries)
}

fn load_index(layout: &RepoLayout) -> Result<QuarantineIndex, WorkflowError> {
    let path = layout.quarantine_index();
    if !path.exists() {
        return Ok(QuarantineIndex::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw)
        .map_err(|err| WorkflowError::validation(format!("invalid quarantine index: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantine_then_release_leaves_no_index_entry() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let task_id = TaskId::from("TASK-0001");

        quarantine_task(&layout, &task_id, "malformed_yaml", Some("bad indent".to_string()))
            .unwrap();
        assert!(is_quarantined(&layout, &task_id).unwrap());

        release_from_quarantine(&layout, &task_id).unwrap();
        assert!(!is_quarantined(&layout, &task_id).unwrap());
        assert!(layout
            .quarantine_resolved_dir()
            .join("TASK-0001.quarantine.json")
            .exists());
        assert!(list_quarantined(&layout, None).unwrap().is_empty());
    }

    #[test]
    fn quarantine_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let task_id = TaskId::from("TASK-0002");

        quarantine_task(&layout, &task_id, "manual", None).unwrap();
        quarantine_task(&layout, &task_id, "manual", None).unwrap();

        let listed = list_quarantined(&layout, Some("pending")).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn invalid_reason_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let err =
            quarantine_task(&layout, &TaskId::from("TASK-0003"), "because", None).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { .. }));
    }

    #[test]
    fn release_of_unknown_task_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let err = release_from_quarantine(&layout, &TaskId::from("TASK-0404")).unwrap_err();
        assert!(matches!(err, WorkflowError::Io { .. }));
    }
}
