//! Diff and index operations used by worktree snapshotting.
//!
//! All index mutation happens through a temporary `GIT_INDEX_FILE` so the
//! repository's real index is never perturbed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;
use crate::process::ProcessOutput;

/// A short-lived index file. Dropping it removes the file.
#[derive(Debug)]
pub struct TempIndex {
    path: PathBuf,
}

impl TempIndex {
    pub fn create() -> Result<Self, GitError> {
        let file = tempfile::Builder::new()
            .prefix("warden-index-")
            .tempfile()
            .map_err(|source| GitError::Io {
                command: "mktemp".to_string(),
                source,
            })?;
        // Keep the path, discard the handle: git wants to own the file.
        let (_, path) = file.keep().map_err(|err| GitError::Io {
            command: "mktemp".to_string(),
            source: err.error,
        })?;
        // git refuses an existing zero-length index
        let _ = std::fs::remove_file(&path);
        Ok(Self { path })
    }

    pub fn env(&self) -> Vec<(OsString, OsString)> {
        vec![(
            OsString::from("GIT_INDEX_FILE"),
            self.path.clone().into_os_string(),
        )]
    }
}

impl Drop for TempIndex {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `git diff --name-status <base>` → `(status, path)` pairs.
pub fn diff_name_status(
    git: &GitCli,
    root: &Path,
    base_commit: &str,
    pathspec: &[String],
    env: &[(OsString, OsString)],
) -> Result<Vec<(String, String)>, GitError> {
    let mut args: Vec<OsString> = vec![
        "diff".into(),
        "--name-status".into(),
        base_commit.into(),
    ];
    push_pathspec(&mut args, pathspec);

    let output = git.run_retry_with_env(root, &args, env)?;
    let mut files = Vec::new();
    for line in output.stdout.lines() {
        if line.is_empty() {
            continue;
        }
        match line.split_once('\t') {
            // Renames come through as "R100\told\tnew"; keep the new path.
            Some((status, rest)) => {
                let path = rest.rsplit('\t').next().unwrap_or(rest);
                files.push((status.to_string(), path.to_string()));
            }
            None => {
                return Err(GitError::Parse {
                    context: format!("unexpected --name-status line: {line}"),
                })
            }
        }
    }
    Ok(files)
}

/// Unified diff. `base_commit = None` diffs the working tree against the
/// (possibly overridden) index.
pub fn diff(
    git: &GitCli,
    root: &Path,
    base_commit: Option<&str>,
    pathspec: &[String],
    env: &[(OsString, OsString)],
) -> Result<String, GitError> {
    let mut args: Vec<OsString> = vec!["diff".into()];
    if let Some(base) = base_commit {
        args.push(base.into());
    }
    push_pathspec(&mut args, pathspec);

    let output = git.run_retry_with_env(root, &args, env)?;
    Ok(output.stdout)
}

pub fn diff_stat(
    git: &GitCli,
    root: &Path,
    base_commit: &str,
    pathspec: &[String],
    env: &[(OsString, OsString)],
) -> Result<String, GitError> {
    let mut args: Vec<OsString> = vec!["diff".into(), "--stat".into(), base_commit.into()];
    push_pathspec(&mut args, pathspec);

    let output = git.run_retry_with_env(root, &args, env)?;
    Ok(output.stdout.trim_end().to_string())
}

/// Populate the (temporary) index from a tree-ish.
pub fn read_tree(
    git: &GitCli,
    root: &Path,
    tree_ish: &str,
    env: &[(OsString, OsString)],
) -> Result<(), GitError> {
    git.run_with_env(root, ["read-tree", tree_ish], env)?;
    Ok(())
}

/// `git add -N` the given paths. Non-zero exits are tolerated: paths may
/// already be tracked.
pub fn add_intent_to_add(
    git: &GitCli,
    root: &Path,
    paths: &[String],
    env: &[(OsString, OsString)],
) -> Result<(), GitError> {
    if paths.is_empty() {
        return Ok(());
    }
    let mut args: Vec<OsString> = vec!["add".into(), "-N".into()];
    for path in paths {
        args.push(path.into());
    }
    let _ = git.run_unchecked(root, args, env)?;
    Ok(())
}

/// Apply a patch to the index only. The caller inspects the result: a
/// non-zero exit means the patch no longer applies cleanly.
pub fn apply_cached(
    git: &GitCli,
    root: &Path,
    diff_file: &Path,
    env: &[(OsString, OsString)],
) -> Result<ProcessOutput, GitError> {
    let args: Vec<OsString> = vec![
        "apply".into(),
        "--cached".into(),
        diff_file.as_os_str().to_os_string(),
    ];
    git.run_unchecked(root, args, env)
}

/// Untracked files (respecting ignores), optionally limited to paths.
pub fn ls_untracked(
    git: &GitCli,
    root: &Path,
    pathspec: &[String],
) -> Result<Vec<String>, GitError> {
    let mut args: Vec<OsString> = vec![
        "ls-files".into(),
        "--others".into(),
        "--exclude-standard".into(),
    ];
    for path in pathspec {
        args.push(path.into());
    }
    let output = git.run_retry_with_env(root, &args, &[])?;
    Ok(output
        .stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn push_pathspec(args: &mut Vec<OsString>, pathspec: &[String]) {
    if !pathspec.is_empty() {
        args.push("--".into());
        for path in pathspec {
            args.push(path.into());
        }
    }
}
