//! Evidence attachments: durable, content-addressed copies of artifacts
//! relevant to a task.

use std::path::Path;

use chrono::Utc;

use warden_core::hash::sha256_file;
use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_git::ProcessRunner;

use crate::context::models::{
    AgentRole, CompressionMetadata, EvidenceAttachment, EvidenceIndex,
};
use crate::context::runtime;
use crate::json;

/// Files up to this size are copied verbatim; anything larger (and every
/// directory) goes through `tar`.
pub const MAX_INLINE_SIZE: u64 = 10 * 1024 * 1024;

pub const ARTIFACT_TYPES: [&str; 6] = [
    "file",
    "directory",
    "qa_output",
    "log",
    "screenshot",
    "report",
];

pub struct EvidenceManager<'a> {
    layout: &'a RepoLayout,
    runner: ProcessRunner,
}

impl<'a> EvidenceManager<'a> {
    pub fn new(layout: &'a RepoLayout) -> Self {
        Self {
            layout,
            runner: ProcessRunner::default(),
        }
    }

    /// Attach an artifact. The id is derived from the stored artifact's
    /// SHA-256, so attaching the same content twice yields the same id
    /// and the second call is a no-op returning the existing record.
    pub fn attach(
        &self,
        task_id: &TaskId,
        artifact_path: &Path,
        artifact_type: &str,
        description: Option<String>,
        agent_role: Option<AgentRole>,
        metadata: Option<serde_json::Value>,
    ) -> Result<EvidenceAttachment, WorkflowError> {
        if !ARTIFACT_TYPES.contains(&artifact_type) {
            return Err(WorkflowError::validation(format!(
                "invalid artifact type '{artifact_type}'. valid values: {}",
                ARTIFACT_TYPES.join(", ")
            )));
        }
        if !artifact_path.exists() {
            return Err(WorkflowError::io(format!(
                "artifact not found: {}",
                artifact_path.display()
            )));
        }

        let evidence_dir = self.layout.evidence_dir(task_id);
        std::fs::create_dir_all(&evidence_dir)?;

        let file_name = artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                WorkflowError::validation(format!(
                    "artifact path has no file name: {}",
                    artifact_path.display()
                ))
            })?;

        let metadata_fs = std::fs::metadata(artifact_path)?;
        let (stored_path, compression) = if metadata_fs.is_dir()
            || metadata_fs.len() > MAX_INLINE_SIZE
        {
            let archive_name = format!("{file_name}.tar.gz");
            let archive_path = evidence_dir.join(&archive_name);
            let parent = artifact_path
                .parent()
                .unwrap_or_else(|| Path::new("."));
            let args = vec![
                "czf".to_string(),
                archive_path.to_string_lossy().into_owned(),
                file_name.clone(),
            ];
            self.runner
                .run(parent, "tar", &args)
                .map_err(WorkflowError::from)?;
            (
                archive_path,
                Some(CompressionMetadata {
                    tool: "tar".to_string(),
                    archive_name,
                    original_size_bytes: metadata_fs.is_file().then(|| metadata_fs.len()),
                }),
            )
        } else {
            let stored = evidence_dir.join(&file_name);
            if artifact_path != stored {
                std::fs::copy(artifact_path, &stored)?;
            }
            (stored, None)
        };

        let sha256 = sha256_file(&stored_path)?;
        let id = sha256[..12].to_string();
        let size_bytes = std::fs::metadata(&stored_path)?.len();

        let mut index = self.read_index(task_id)?;
        if let Some(existing) = index.attachments.iter().find(|a| a.id == id) {
            return Ok(existing.clone());
        }

        let attachment = EvidenceAttachment {
            id,
            kind: artifact_type.to_string(),
            path: runtime::repo_relative(self.layout, &stored_path),
            sha256,
            size_bytes,
            created_at: Utc::now().to_rfc3339(),
            description,
            agent_role: agent_role.map(|r| r.as_str().to_string()),
            metadata,
            compression,
        };

        index.attachments.push(attachment.clone());
        json::write_sorted(&self.layout.evidence_index(task_id), &index)?;

        Ok(attachment)
    }

    /// Attachments sorted by creation time.
    pub fn list(&self, task_id: &TaskId) -> Result<Vec<EvidenceAttachment>, WorkflowError> {
        let mut attachments = self.read_index(task_id)?.attachments;
        attachments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(attachments)
    }

    fn read_index(&self, task_id: &TaskId) -> Result<EvidenceIndex, WorkflowError> {
        let path = self.layout.evidence_index(task_id);
        if !path.exists() {
            return Ok(EvidenceIndex::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|err| WorkflowError::validation(format!("invalid evidence index: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        (dir, layout)
    }

    #[test]
    fn attach_copies_small_files_and_indexes_them() {
        let (dir, layout) = fixture();
        let manager = EvidenceManager::new(&layout);
        let task_id = TaskId::from("TASK-0001");

        let artifact = dir.path().join("qa.log");
        std::fs::write(&artifact, "all tests passed\n").unwrap();

        let attachment = manager
            .attach(&task_id, &artifact, "qa_output", Some("QA log".to_string()), None, None)
            .unwrap();

        assert_eq!(attachment.id.len(), 12);
        assert!(dir
            .path()
            .join(".agent-output/TASK-0001/evidence/qa.log")
            .exists());

        let listed = manager.list(&task_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, attachment.id);
    }

    #[test]
    fn same_content_yields_same_id() {
        let (dir, layout) = fixture();
        let manager = EvidenceManager::new(&layout);
        let task_id = TaskId::from("TASK-0001");

        let artifact = dir.path().join("report.txt");
        std::fs::write(&artifact, "findings\n").unwrap();

        let first = manager
            .attach(&task_id, &artifact, "report", None, None, None)
            .unwrap();
        let second = manager
            .attach(&task_id, &artifact, "report", None, None, None)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(manager.list(&task_id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let (dir, layout) = fixture();
        let manager = EvidenceManager::new(&layout);
        let artifact = dir.path().join("x.txt");
        std::fs::write(&artifact, "x").unwrap();

        let err = manager
            .attach(&TaskId::from("TASK-0001"), &artifact, "mystery", None, None, None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { .. }));
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let (dir, layout) = fixture();
        let manager = EvidenceManager::new(&layout);
        let err = manager
            .attach(
                &TaskId::from("TASK-0001"),
                &dir.path().join("nope.txt"),
                "file",
                None,
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Io { .. }));
    }

    #[test]
    fn directories_are_archived() {
        let (dir, layout) = fixture();
        let manager = EvidenceManager::new(&layout);
        let task_id = TaskId::from("TASK-0001");

        let artifact_dir = dir.path().join("coverage");
        std::fs::create_dir_all(&artifact_dir).unwrap();
        std::fs::write(artifact_dir.join("index.html"), "<html>").unwrap();

        let attachment = manager
            .attach(&task_id, &artifact_dir, "directory", None, None, None)
            .unwrap();
        assert!(attachment.compression.is_some());
        assert!(attachment.path.ends_with("coverage.tar.gz"));
    }
}
