//! Repository discovery and status queries.

use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub root: PathBuf,
    pub git_dir: PathBuf,
}

pub fn discover_repo(start_path: &Path, git: &GitCli) -> Result<RepoHandle, GitError> {
    let inside = match git.run(start_path, ["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => output.stdout.trim().eq("true"),
        Err(GitError::CommandFailed { .. }) | Err(GitError::CommandFailedWithStderr { .. }) => {
            false
        }
        Err(err) => return Err(err),
    };

    if !inside {
        return Err(GitError::NotARepository {
            path: start_path.to_path_buf(),
        });
    }

    let root_raw = git.run(start_path, ["rev-parse", "--show-toplevel"])?;
    let root = PathBuf::from(root_raw.stdout.trim());

    let git_dir_raw = git.run(&root, ["rev-parse", "--git-dir"])?;
    let git_dir_rel = PathBuf::from(git_dir_raw.stdout.trim());
    let git_dir = if git_dir_rel.is_absolute() {
        git_dir_rel
    } else {
        root.join(git_dir_rel)
    };

    Ok(RepoHandle { root, git_dir })
}

pub fn head_sha(root: &Path, git: &GitCli) -> Result<String, GitError> {
    let output = git.run_retry(root, &["rev-parse", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

pub fn current_branch(root: &Path, git: &GitCli) -> Result<Option<String>, GitError> {
    let output = git.run_retry(root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = output.stdout.trim().to_string();
    // "HEAD" means detached
    if branch == "HEAD" {
        return Ok(None);
    }
    Ok(Some(branch))
}

/// One `git status --porcelain` line: two status characters and a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub status: String,
    pub path: String,
}

pub fn status_porcelain(root: &Path, git: &GitCli) -> Result<Vec<StatusEntry>, GitError> {
    let output = git.run_retry(root, &["status", "--porcelain", "--untracked-files=all"])?;
    Ok(parse_porcelain(&output.stdout))
}

fn parse_porcelain(stdout: &str) -> Vec<StatusEntry> {
    stdout
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| StatusEntry {
            status: line[..2].to_string(),
            path: line[3..].trim().to_string(),
        })
        .collect()
}

pub fn is_dirty(root: &Path, git: &GitCli) -> Result<bool, GitError> {
    Ok(!status_porcelain(root, git)?.is_empty())
}

/// Dirty-tree check with an allowance for expected paths (the task's own
/// context directory is always expected to change under it).
pub fn check_dirty_tree(
    root: &Path,
    git: &GitCli,
    allow_preexisting_untracked: bool,
    expected_prefixes: &[String],
) -> Result<(bool, Vec<String>), GitError> {
    let entries = status_porcelain(root, git)?;
    let mut dirty: Vec<String> = Vec::new();

    for entry in entries {
        if allow_preexisting_untracked && entry.status.trim() == "??" {
            continue;
        }
        dirty.push(entry.path);
    }

    let unexpected: Vec<String> = dirty
        .into_iter()
        .filter(|path| !expected_prefixes.iter().any(|prefix| path.starts_with(prefix)))
        .collect();

    Ok((unexpected.is_empty(), unexpected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcelain_lines_parse_into_entries() {
        let entries = parse_porcelain(" M src/lib.rs\n?? notes.txt\nA  new.rs\n");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, " M");
        assert_eq!(entries[0].path, "src/lib.rs");
        assert_eq!(entries[1].status, "??");
        assert_eq!(entries[1].path, "notes.txt");
    }

    #[test]
    fn discover_fails_outside_git() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_repo(dir.path(), &GitCli::default()).unwrap_err();
        assert!(matches!(err, GitError::NotARepository { .. }));
    }
}
