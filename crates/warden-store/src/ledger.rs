//! Exception ledger: tasks the core refused to initialize a context for,
//! with a remediation deadline. Idempotent add/update, atomic rewrite
//! under the ledger's own lock.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};

use crate::json;
use crate::lock::{FileLock, LOCK_TIMEOUT};

pub const LEDGER_VERSION: &str = "1.0";

/// Days until a fresh exception's remediation deadline.
const REMEDIATION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemediationStatus {
    pub owner: String,
    /// open, in_progress, resolved, wont_fix.
    pub status: String,
    pub deadline: String,
    #[serde(default)]
    pub resolved_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExceptionLedgerEntry {
    pub task_id: TaskId,
    /// malformed_yaml, invalid_schema, missing_standards, …
    pub exception_type: String,
    pub detected_at: String,
    pub remediation: RemediationStatus,
    #[serde(default)]
    pub parse_error: Option<String>,
    /// Trigger that removes the entry automatically.
    #[serde(default = "default_auto_remove")]
    pub auto_remove_on: String,
}

fn default_auto_remove() -> String {
    "task_completion".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Ledger {
    version: String,
    last_updated: String,
    exceptions: Vec<ExceptionLedgerEntry>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION.to_string(),
            last_updated: Utc::now().to_rfc3339(),
            exceptions: Vec::new(),
        }
    }
}

/// Add or refresh an exception entry. Existing entries keep their
/// deadline; only `detected_at` and `parse_error` are updated.
pub fn add_exception(
    layout: &RepoLayout,
    task_id: &TaskId,
    exception_type: &str,
    parse_error: Option<String>,
) -> Result<(), WorkflowError> {
    let _lock = FileLock::acquire(&layout.exception_ledger_lock(), LOCK_TIMEOUT)?;
    let mut ledger = load(layout)?;
    let now = Utc::now().to_rfc3339();

    match ledger.exceptions.iter_mut().find(|e| e.task_id == *task_id) {
        Some(existing) => {
            existing.detected_at = now;
            if parse_error.is_some() {
                existing.parse_error = parse_error;
            }
        }
        None => {
            let deadline = (Utc::now() + Duration::days(REMEDIATION_DAYS))
                .date_naive()
                .to_string();
            ledger.exceptions.push(ExceptionLedgerEntry {
                task_id: task_id.clone(),
                exception_type: exception_type.to_string(),
                detected_at: now,
                remediation: RemediationStatus {
                    owner: "system".to_string(),
                    status: "open".to_string(),
                    deadline,
                    resolved_at: None,
                    notes: None,
                },
                parse_error,
                auto_remove_on: default_auto_remove(),
            });
        }
    }

    save(layout, ledger)
}

/// True when the task has an active ledger entry (its warnings are
/// suppressed elsewhere).
pub fn has_exception(layout: &RepoLayout, task_id: &TaskId) -> Result<bool, WorkflowError> {
    if !layout.exception_ledger().exists() {
        return Ok(false);
    }
    let _lock = FileLock::acquire(&layout.exception_ledger_lock(), LOCK_TIMEOUT)?;
    let ledger = load(layout)?;
    Ok(ledger.exceptions.iter().any(|e| e.task_id == *task_id))
}

/// Remove entries matching the task and the given auto-remove trigger.
pub fn cleanup_exception(
    layout: &RepoLayout,
    task_id: &TaskId,
    trigger: &str,
) -> Result<usize, WorkflowError> {
    if !layout.exception_ledger().exists() {
        return Ok(0);
    }
    let _lock = FileLock::acquire(&layout.exception_ledger_lock(), LOCK_TIMEOUT)?;
    let mut ledger = load(layout)?;
    let before = ledger.exceptions.len();
    ledger
        .exceptions
        .retain(|e| !(e.task_id == *task_id && e.auto_remove_on == trigger));
    let removed = before - ledger.exceptions.len();
    if removed > 0 {
        save(layout, ledger)?;
    }
    Ok(removed)
}

pub fn list_exceptions(
    layout: &RepoLayout,
    status_filter: Option<&str>,
) -> Result<Vec<ExceptionLedgerEntry>, WorkflowError> {
    if !layout.exception_ledger().exists() {
        return Ok(Vec::new());
    }
    let _lock = FileLock::acquire(&layout.exception_ledger_lock(), LOCK_TIMEOUT)?;
    let ledger = load(layout)?;
    Ok(ledger
        .exceptions
        .into_iter()
        .filter(|e| status_filter.is_none() || status_filter == Some(e.remediation.status.as_str()))
        .collect())
}

/// Mark an entry resolved with a timestamp and optional notes.
pub fn resolve_exception(
    layout: &RepoLayout,
    task_id: &TaskId,
    notes: Option<String>,
) -> Result<(), WorkflowError> {
    let _lock = FileLock::acquire(&layout.exception_ledger_lock(), LOCK_TIMEOUT)?;
    let mut ledger = load(layout)?;

    let entry = ledger
        .exceptions
        .iter_mut()
        .find(|e| e.task_id == *task_id)
        .ok_or_else(|| {
            WorkflowError::validation(format!("task {task_id} not found in exception ledger"))
        })?;

    entry.remediation.status = "resolved".to_string();
    entry.remediation.resolved_at = Some(Utc::now().to_rfc3339());
    if notes.is_some() {
        entry.remediation.notes = notes;
    }

    save(layout, ledger)
}

fn load(layout: &RepoLayout) -> Result<Ledger, WorkflowError> {
    let path = layout.exception_ledger();
    if !path.exists() {
        return Ok(Ledger::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw)
        .map_err(|err| WorkflowError::validation(format!("invalid exception ledger: {err}")))
}

fn save(layout: &RepoLayout, mut ledger: Ledger) -> Result<(), WorkflowError> {
    ledger.last_updated = Utc::now().to_rfc3339();
    json::write_sorted(&layout.exception_ledger(), &ledger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let task_id = TaskId::from("TASK-0001");

        add_exception(&layout, &task_id, "invalid_schema", Some("scope.in empty".to_string()))
            .unwrap();
        add_exception(&layout, &task_id, "invalid_schema", Some("plan empty".to_string()))
            .unwrap();

        let entries = list_exceptions(&layout, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].parse_error.as_deref(), Some("plan empty"));
        assert_eq!(entries[0].remediation.status, "open");
        assert!(has_exception(&layout, &task_id).unwrap());
    }

    #[test]
    fn resolve_marks_entry_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let task_id = TaskId::from("TASK-0002");

        add_exception(&layout, &task_id, "malformed_yaml", None).unwrap();
        resolve_exception(&layout, &task_id, Some("fixed indentation".to_string())).unwrap();

        let entries = list_exceptions(&layout, Some("resolved")).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].remediation.resolved_at.is_some());

        let open = list_exceptions(&layout, Some("open")).unwrap();
        assert!(open.is_empty());
    }

    #[test]
    fn cleanup_removes_matching_trigger_only() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let task_id = TaskId::from("TASK-0003");

        add_exception(&layout, &task_id, "invalid_schema", None).unwrap();
        assert_eq!(cleanup_exception(&layout, &task_id, "task_deletion").unwrap(), 0);
        assert_eq!(
            cleanup_exception(&layout, &task_id, "task_completion").unwrap(),
            1
        );
        assert!(!has_exception(&layout, &task_id).unwrap());
    }

    #[test]
    fn resolve_unknown_task_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let err = resolve_exception(&layout, &TaskId::from("TASK-0404"), None).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { .. }));
    }
}
