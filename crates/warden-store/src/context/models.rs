//! Record types for `context.json`, `context.manifest`, evidence and
//! excerpt indices, and the compliance documents.
//!
//! Everything here is a named serde record with an explicit schema;
//! unknown incoming fields fail closed.

use serde::{Deserialize, Serialize};

use warden_core::types::TaskId;
use warden_core::WorkflowError;

pub const CONTEXT_SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// The three agent roles that hand a task off to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Implementer,
    Reviewer,
    Validator,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Implementer => "implementer",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Validator => "validator",
        }
    }
}

impl std::str::FromStr for AgentRole {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "implementer" => Ok(AgentRole::Implementer),
            "reviewer" => Ok(AgentRole::Reviewer),
            "validator" => Ok(AgentRole::Validator),
            other => Err(WorkflowError::validation(format!(
                "invalid agent role '{other}'. valid values: implementer, reviewer, validator"
            ))),
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared validation command, normalized from either the bare-string or
/// the mapping YAML shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationCommand {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_cwd")]
    pub cwd: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "RetryPolicy::default")]
    pub retry_policy: RetryPolicy,
    #[serde(default = "default_criticality")]
    pub criticality: String,
    #[serde(default = "default_exit_codes")]
    pub expected_exit_codes: Vec<i32>,
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_criticality() -> String {
    "required".to_string()
}

fn default_exit_codes() -> Vec<i32> {
    vec![0]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 1000,
        }
    }
}

/// Frozen copy of the task file's planning fields, taken at init.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSnapshot {
    pub title: String,
    pub priority: String,
    pub area: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope_in: Vec<String>,
    #[serde(default)]
    pub scope_out: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub plan_steps: Vec<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub validation_commands: Vec<ValidationCommand>,
    /// Filled in once the byte-for-byte task snapshot has been written.
    #[serde(default)]
    pub snapshot_path: Option<String>,
    #[serde(default)]
    pub snapshot_sha256: Option<String>,
    #[serde(default)]
    pub original_path: Option<String>,
    #[serde(default)]
    pub completed_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Citation of a standards section, enriched with the cached excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardsCitation {
    pub file: String,
    pub section: String,
    #[serde(default)]
    pub requirement: Option<String>,
    #[serde(default)]
    pub line_span: Option<(usize, usize)>,
    #[serde(default)]
    pub content_sha256: Option<String>,
    #[serde(default)]
    pub excerpt_id: Option<String>,
    #[serde(default)]
    pub cached_path: Option<String>,
    #[serde(default)]
    pub extracted_at: Option<String>,
}

/// Cached copy of a cited section, keyed by the short content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardsExcerpt {
    pub file: String,
    pub section: String,
    /// First ≤140 characters of the section prose.
    pub requirement: String,
    pub line_span: (usize, usize),
    pub content_sha256: String,
    pub excerpt_id: String,
    pub cached_path: String,
    pub extracted_at: String,
}

impl StandardsExcerpt {
    pub fn to_citation(&self) -> StandardsCitation {
        StandardsCitation {
            file: self.file.clone(),
            section: self.section.clone(),
            requirement: Some(self.requirement.clone()),
            line_span: Some(self.line_span),
            content_sha256: Some(self.content_sha256.clone()),
            excerpt_id: Some(self.excerpt_id.clone()),
            cached_path: Some(self.cached_path.clone()),
            extracted_at: Some(self.extracted_at.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcerptIndex {
    pub excerpts: Vec<StandardsExcerpt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QACoverageSummary {
    #[serde(default)]
    pub lines: Option<f64>,
    #[serde(default)]
    pub branches: Option<f64>,
    #[serde(default)]
    pub functions: Option<f64>,
    #[serde(default)]
    pub statements: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QACommandSummary {
    #[serde(default)]
    pub lint_errors: Option<u64>,
    #[serde(default)]
    pub lint_warnings: Option<u64>,
    #[serde(default)]
    pub type_errors: Option<u64>,
    #[serde(default)]
    pub tests_passed: Option<u64>,
    #[serde(default)]
    pub tests_failed: Option<u64>,
    #[serde(default)]
    pub coverage: Option<QACoverageSummary>,
}

impl QACommandSummary {
    pub fn is_empty(&self) -> bool {
        self.lint_errors.is_none()
            && self.lint_warnings.is_none()
            && self.type_errors.is_none()
            && self.tests_passed.is_none()
            && self.tests_failed.is_none()
            && self.coverage.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QACommandResult {
    pub command_id: String,
    pub command: String,
    pub exit_code: i32,
    /// Caller-supplied; absent means unknown, never zero.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub log_path: Option<String>,
    #[serde(default)]
    pub log_sha256: Option<String>,
    #[serde(default)]
    pub summary: Option<QACommandSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QAResults {
    pub recorded_at: String,
    pub agent: String,
    #[serde(default)]
    pub git_sha: Option<String>,
    pub results: Vec<QACommandResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationBaseline {
    pub commands: Vec<String>,
    #[serde(default)]
    pub qa_results: Option<QAResults>,
}

/// The frozen provenance snapshot. Written exactly once at init; only
/// coordination records may change afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImmutableContext {
    pub task_snapshot: TaskSnapshot,
    pub standards_citations: Vec<StandardsCitation>,
    pub validation_baseline: ValidationBaseline,
    /// Normalized directory patterns defining the task's editable scope.
    pub repo_paths: Vec<String>,
}

/// Per-file entry inside a worktree snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSnapshot {
    pub path: String,
    /// Change status: A, M, D, R…
    pub change: String,
    /// SHA-256 of the working-tree content; `None` for deletions.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// State of the working tree at an agent hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorktreeSnapshot {
    pub base_commit: String,
    pub snapshot_time: String,
    /// Repo-relative path of the stored unified diff.
    pub diff_from_base: String,
    /// SHA-256 of the normalized diff.
    pub diff_sha: String,
    pub files_changed: Vec<FileSnapshot>,
    pub diff_stat: String,
    /// SHA-256 over the canonicalized `repo_paths`.
    pub scope_hash: String,
    #[serde(default)]
    pub diff_from_implementer: Option<String>,
    #[serde(default)]
    pub incremental_diff_sha: Option<String>,
    #[serde(default)]
    pub incremental_diff_error: Option<String>,
}

/// Mutable per-agent slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentCoordination {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub qa_log_path: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub worktree_snapshot: Option<WorktreeSnapshot>,
}

impl Default for AgentCoordination {
    fn default() -> Self {
        Self {
            status: "pending".to_string(),
            session_id: None,
            qa_log_path: None,
            completed_at: None,
            worktree_snapshot: None,
        }
    }
}

/// Typed update payload for a coordination slot. Unknown fields fail
/// closed at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinationUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub qa_log_path: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub worktree_snapshot: Option<WorktreeSnapshot>,
}

impl CoordinationUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.session_id.is_none()
            && self.qa_log_path.is_none()
            && self.completed_at.is_none()
            && self.worktree_snapshot.is_none()
    }

    pub fn apply(&self, slot: &mut AgentCoordination) {
        if let Some(status) = &self.status {
            slot.status = status.clone();
        }
        if let Some(session_id) = &self.session_id {
            slot.session_id = Some(session_id.clone());
        }
        if let Some(qa_log_path) = &self.qa_log_path {
            slot.qa_log_path = Some(qa_log_path.clone());
        }
        if let Some(completed_at) = &self.completed_at {
            slot.completed_at = Some(completed_at.clone());
        }
        if let Some(snapshot) = &self.worktree_snapshot {
            slot.worktree_snapshot = Some(snapshot.clone());
        }
    }
}

/// The full `context.json` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskContext {
    pub version: u32,
    pub task_id: TaskId,
    pub git_head: String,
    pub task_file_sha: String,
    pub created_at: String,
    pub created_by: String,
    pub immutable: ImmutableContext,
    pub implementer: AgentCoordination,
    pub reviewer: AgentCoordination,
    pub validator: AgentCoordination,
    pub audit_updated_at: String,
    pub audit_updated_by: String,
    pub audit_update_count: u64,
}

impl TaskContext {
    pub fn coordination(&self, role: AgentRole) -> &AgentCoordination {
        match role {
            AgentRole::Implementer => &self.implementer,
            AgentRole::Reviewer => &self.reviewer,
            AgentRole::Validator => &self.validator,
        }
    }

    pub fn coordination_mut(&mut self, role: AgentRole) -> &mut AgentCoordination {
        match role {
            AgentRole::Implementer => &mut self.implementer,
            AgentRole::Reviewer => &mut self.reviewer,
            AgentRole::Validator => &mut self.validator,
        }
    }
}

/// One source file that contributed to the immutable section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
    pub path: String,
    pub sha256: String,
    /// `task_yaml` or `standards_citation`.
    pub purpose: String,
}

/// `context.manifest`: the sole authoritative provenance record used by
/// rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextManifest {
    pub version: u32,
    pub context_schema_version: u32,
    pub source_files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionMetadata {
    pub tool: String,
    pub archive_name: String,
    #[serde(default)]
    pub original_size_bytes: Option<u64>,
}

/// Durable record of an artifact attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceAttachment {
    /// First 12 hex chars of the stored artifact's SHA-256.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Repo-relative path of the stored artifact.
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub created_at: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_role: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub compression: Option<CompressionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceIndex {
    pub attachments: Vec<EvidenceAttachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_role_round_trips() {
        for role in [
            AgentRole::Implementer,
            AgentRole::Reviewer,
            AgentRole::Validator,
        ] {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), role);
        }
        assert!("operator".parse::<AgentRole>().is_err());
    }

    #[test]
    fn coordination_update_rejects_unknown_fields() {
        let err = serde_json::from_str::<CoordinationUpdate>(r#"{"statu": "done"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn coordination_update_merges_only_given_fields() {
        let mut slot = AgentCoordination::default();
        slot.session_id = Some("keep-me".to_string());

        let update: CoordinationUpdate =
            serde_json::from_str(r#"{"status": "done", "qa_log_path": "logs/qa.txt"}"#).unwrap();
        update.apply(&mut slot);

        assert_eq!(slot.status, "done");
        assert_eq!(slot.qa_log_path.as_deref(), Some("logs/qa.txt"));
        assert_eq!(slot.session_id.as_deref(), Some("keep-me"));
    }

    #[test]
    fn context_json_rejects_unknown_top_level_fields() {
        let raw = r#"{"version": 1, "task_id": "TASK-1", "surprise": true}"#;
        assert!(serde_json::from_str::<TaskContext>(raw).is_err());
    }

    #[test]
    fn validation_command_defaults() {
        let cmd: ValidationCommand =
            serde_json::from_str(r#"{"id": "val-001", "command": "pnpm lint"}"#).unwrap();
        assert_eq!(cmd.cwd, ".");
        assert_eq!(cmd.criticality, "required");
        assert_eq!(cmd.expected_exit_codes, vec![0]);
        assert_eq!(cmd.retry_policy.max_attempts, 1);
    }
}
