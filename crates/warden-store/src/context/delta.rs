//! Worktree snapshotting and drift detection across agent hand-offs.
//!
//! A snapshot records the base commit, a normalized-diff hash, per-file
//! checksums, and the scope hash. Verification recomputes all three the
//! same way; any mismatch is drift.

use std::path::Path;

use chrono::Utc;

use warden_core::hash::{sha256_file, sha256_hex};
use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};
use warden_git::diff::{self, TempIndex};
use warden_git::GitCli;

use crate::context::models::{AgentRole, FileSnapshot, WorktreeSnapshot};
use crate::context::runtime;
use crate::json;

pub struct DeltaTracker<'a> {
    layout: &'a RepoLayout,
    git: &'a GitCli,
}

impl<'a> DeltaTracker<'a> {
    pub fn new(layout: &'a RepoLayout, git: &'a GitCli) -> Self {
        Self { layout, git }
    }

    /// Capture the working tree relative to `base_commit`, restricted to
    /// the task's scope. Untracked in-scope files are staged intent-to-add
    /// in a temporary index so the diff includes them.
    pub fn snapshot_worktree(
        &self,
        task_id: &TaskId,
        role: AgentRole,
        base_commit: &str,
        repo_paths: &[String],
    ) -> Result<WorktreeSnapshot, WorkflowError> {
        let root = &self.layout.repo_root;
        let pathspec = runtime::scope_pathspec(repo_paths);

        let index = TempIndex::create().map_err(WorkflowError::from)?;
        let env = index.env();
        diff::read_tree(self.git, root, base_commit, &env)?;

        let untracked = diff::ls_untracked(self.git, root, &pathspec)?;
        diff::add_intent_to_add(self.git, root, &untracked, &env)?;

        let raw_diff = diff::diff(self.git, root, Some(base_commit), &pathspec, &env)?;
        let diff_sha = sha256_hex(normalize_diff_for_hashing(&raw_diff).as_bytes());

        let context_dir = self.layout.context_dir(task_id);
        std::fs::create_dir_all(&context_dir)?;
        let diff_file = context_dir.join(format!("{}-from-base.diff", role.as_str()));
        json::atomic_write(&diff_file, &raw_diff)?;

        let name_status = diff::diff_name_status(self.git, root, base_commit, &pathspec, &env)?;
        let files_changed = self.file_snapshots(&name_status);

        let diff_stat = diff::diff_stat(self.git, root, base_commit, &pathspec, &env)?;

        Ok(WorktreeSnapshot {
            base_commit: base_commit.to_string(),
            snapshot_time: Utc::now().to_rfc3339(),
            diff_from_base: runtime::repo_relative(self.layout, &diff_file),
            diff_sha,
            files_changed,
            diff_stat,
            scope_hash: runtime::scope_hash(repo_paths),
            diff_from_implementer: None,
            incremental_diff_sha: None,
            incremental_diff_error: None,
        })
    }

    /// Verify the working tree still matches `snapshot`, in order: scope
    /// hash, recomputed diff hash, per-file checksums. Any mismatch is a
    /// drift error carrying the offending files when known.
    pub fn verify_worktree_state(
        &self,
        snapshot: &WorktreeSnapshot,
        repo_paths: &[String],
    ) -> Result<(), WorkflowError> {
        let current_scope = runtime::scope_hash(repo_paths);
        if current_scope != snapshot.scope_hash {
            return Err(WorkflowError::drift(
                "scope hash mismatch: repo_paths changed since the snapshot was taken",
                Vec::new(),
            ));
        }

        let root = &self.layout.repo_root;
        let pathspec = runtime::scope_pathspec(repo_paths);

        let index = TempIndex::create().map_err(WorkflowError::from)?;
        let env = index.env();
        diff::read_tree(self.git, root, &snapshot.base_commit, &env)?;
        let untracked = diff::ls_untracked(self.git, root, &pathspec)?;
        diff::add_intent_to_add(self.git, root, &untracked, &env)?;

        let raw_diff = diff::diff(self.git, root, Some(&snapshot.base_commit), &pathspec, &env)?;
        let current_sha = sha256_hex(normalize_diff_for_hashing(&raw_diff).as_bytes());
        if current_sha != snapshot.diff_sha {
            // Name the offenders: recorded files whose checksum moved,
            // plus files changed now that the snapshot never recorded.
            let mut offending = self.mismatched_files(&snapshot.files_changed);
            let current_files =
                diff::diff_name_status(self.git, root, &snapshot.base_commit, &pathspec, &env)?;
            for (_, path) in current_files {
                let recorded = snapshot.files_changed.iter().any(|f| f.path == path);
                if !recorded && !offending.contains(&path) {
                    offending.push(path);
                }
            }
            return Err(WorkflowError::drift(
                format!(
                    "worktree diff no longer matches the recorded snapshot \
                     (expected {}, found {})",
                    &snapshot.diff_sha[..8],
                    &current_sha[..8]
                ),
                offending,
            ));
        }

        let mismatched = self.mismatched_files(&snapshot.files_changed);
        if !mismatched.is_empty() {
            return Err(WorkflowError::drift(
                format!("{} file(s) changed since the snapshot", mismatched.len()),
                mismatched,
            ));
        }

        Ok(())
    }

    /// Reviewer-only: replay the implementer's diff into a temporary index
    /// rooted at `base_commit`, then diff the working tree against it.
    /// Returns `(diff, None)` on success or `(None, error)` when the
    /// patch no longer applies cleanly.
    pub fn incremental_diff(
        &self,
        implementer_diff: &Path,
        base_commit: &str,
        repo_paths: &[String],
    ) -> Result<(Option<String>, Option<String>), WorkflowError> {
        let root = &self.layout.repo_root;
        let pathspec = runtime::scope_pathspec(repo_paths);

        let index = TempIndex::create().map_err(WorkflowError::from)?;
        let env = index.env();
        diff::read_tree(self.git, root, base_commit, &env)?;

        let applied = diff::apply_cached(self.git, root, implementer_diff, &env)?;
        if !applied.success() {
            let detail = applied.stderr.lines().next().unwrap_or("patch conflict");
            return Ok((
                None,
                Some(format!(
                    "implementer diff no longer applies onto {}: {detail}",
                    &base_commit[..base_commit.len().min(8)]
                )),
            ));
        }

        let incremental = diff::diff(self.git, root, None, &pathspec, &env)?;
        Ok((Some(incremental), None))
    }

    fn file_snapshots(&self, name_status: &[(String, String)]) -> Vec<FileSnapshot> {
        name_status
            .iter()
            .map(|(status, path)| {
                let full = self.layout.repo_root.join(path);
                let checksum = if full.exists() {
                    sha256_file(&full).ok()
                } else {
                    None
                };
                FileSnapshot {
                    path: path.clone(),
                    change: status.chars().take(1).collect(),
                    checksum,
                }
            })
            .collect()
    }

    fn mismatched_files(&self, expected: &[FileSnapshot]) -> Vec<String> {
        let mut mismatched = Vec::new();
        for file in expected {
            let full = self.layout.repo_root.join(&file.path);
            let current = if full.exists() {
                sha256_file(&full).ok()
            } else {
                None
            };
            if current != file.checksum {
                mismatched.push(file.path.clone());
            }
        }
        mismatched
    }
}

/// Strip header noise (index/mode/similarity lines) and trailing
/// whitespace so the hash tracks content, not metadata git happens to
/// print.
pub fn normalize_diff_for_hashing(diff: &str) -> String {
    const NOISE: [&str; 5] = [
        "index ",
        "similarity index ",
        "dissimilarity index ",
        "old mode",
        "new mode",
    ];
    diff.lines()
        .filter(|line| !NOISE.iter().any(|prefix| line.starts_with(prefix)))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_drops_index_lines_and_trailing_whitespace() {
        let diff = "diff --git a/x b/x\nindex 1234567..89abcde 100644\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-one  \n+two\n";
        let normalized = normalize_diff_for_hashing(diff);
        assert!(!normalized.contains("index 1234567"));
        assert!(normalized.contains("-one"));
        assert!(!normalized.contains("one  "));
    }

    #[test]
    fn equivalent_diffs_hash_identically() {
        let a = "diff --git a/x b/x\nindex 111..222 100644\n@@ -1 +1 @@\n-one\n+two\n";
        let b = "diff --git a/x b/x\nindex 333..444 100644\n@@ -1 +1 @@\n-one\n+two \n";
        assert_eq!(
            sha256_hex(normalize_diff_for_hashing(a).as_bytes()),
            sha256_hex(normalize_diff_for_hashing(b).as_bytes())
        );
    }
}
