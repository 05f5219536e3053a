//! Repository layout: where tasks, caches, contexts, and compliance
//! records live relative to the repo root.

use std::path::{Path, PathBuf};

use crate::error::WorkflowError;
use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    pub repo_root: PathBuf,
}

impl RepoLayout {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Walk up from `start` looking for a `.git` entry.
    pub fn discover(start: &Path) -> Result<Self, WorkflowError> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(".git").exists() {
                return Ok(Self::new(dir));
            }
            current = dir.parent();
        }
        Err(WorkflowError::general(format!(
            "could not find repository root (no .git directory above {})",
            start.display()
        )))
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.repo_root.join("tasks")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.repo_root.join("docs").join("completed-tasks")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.tasks_dir().join(".cache")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir().join("tasks_index.json")
    }

    pub fn cache_lock(&self) -> PathBuf {
        self.cache_dir().join("tasks_index.lock")
    }

    pub fn snapshot_counter(&self) -> PathBuf {
        self.cache_dir().join("snapshot_counter.txt")
    }

    pub fn context_root(&self) -> PathBuf {
        self.repo_root.join(".agent-output")
    }

    pub fn context_store_lock(&self) -> PathBuf {
        self.context_root().join(".context_store.lock")
    }

    pub fn context_dir(&self, task_id: &TaskId) -> PathBuf {
        self.context_root().join(&task_id.0)
    }

    pub fn context_file(&self, task_id: &TaskId) -> PathBuf {
        self.context_dir(task_id).join("context.json")
    }

    pub fn manifest_file(&self, task_id: &TaskId) -> PathBuf {
        self.context_dir(task_id).join("context.manifest")
    }

    pub fn task_snapshot_file(&self, task_id: &TaskId) -> PathBuf {
        self.context_dir(task_id).join("task-snapshot.yaml")
    }

    pub fn evidence_dir(&self, task_id: &TaskId) -> PathBuf {
        self.context_dir(task_id).join("evidence")
    }

    pub fn evidence_index(&self, task_id: &TaskId) -> PathBuf {
        self.evidence_dir(task_id).join("index.json")
    }

    pub fn standards_excerpt_dir(&self, task_id: &TaskId) -> PathBuf {
        self.evidence_dir(task_id).join("standards")
    }

    pub fn standards_excerpt_index(&self, task_id: &TaskId) -> PathBuf {
        self.standards_excerpt_dir(task_id).join("index.json")
    }

    pub fn compliance_dir(&self) -> PathBuf {
        self.repo_root.join("docs").join("compliance")
    }

    pub fn exception_ledger(&self) -> PathBuf {
        self.compliance_dir().join("context-cache-exceptions.json")
    }

    pub fn exception_ledger_lock(&self) -> PathBuf {
        self.compliance_dir().join("context-cache-exceptions.lock")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.compliance_dir().join("quarantine")
    }

    pub fn quarantine_index(&self) -> PathBuf {
        self.quarantine_dir().join("index.json")
    }

    pub fn quarantine_index_lock(&self) -> PathBuf {
        self.quarantine_dir().join("index.json.lock")
    }

    pub fn quarantine_entry(&self, task_id: &TaskId) -> PathBuf {
        self.quarantine_dir()
            .join(format!("{}.quarantine.json", task_id.0))
    }

    pub fn quarantine_resolved_dir(&self) -> PathBuf {
        self.quarantine_dir().join("resolved")
    }

    /// Repo-relative rendering of an absolute path; falls back to the
    /// absolute form when the path is outside the repo.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.repo_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_walks_up_to_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("tasks").join("backend");
        std::fs::create_dir_all(&nested).unwrap();

        let layout = RepoLayout::discover(&nested).unwrap();
        assert_eq!(layout.repo_root, dir.path());
    }

    #[test]
    fn discover_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RepoLayout::discover(dir.path()).is_err());
    }

    #[test]
    fn context_paths_nest_under_agent_output() {
        let layout = RepoLayout::new("/repo");
        let id = TaskId::from("TASK-0001");
        assert_eq!(
            layout.context_file(&id),
            PathBuf::from("/repo/.agent-output/TASK-0001/context.json")
        );
        assert_eq!(
            layout.standards_excerpt_dir(&id),
            PathBuf::from("/repo/.agent-output/TASK-0001/evidence/standards")
        );
    }
}
