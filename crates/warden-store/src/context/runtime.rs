//! Shared runtime helpers for the context store: the store-wide lock,
//! scope normalization, and staleness checks.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use warden_core::hash::sha256_hex;
use warden_core::{RepoLayout, WorkflowError};
use warden_git::{repo, GitCli};

use crate::lock::{FileLock, LOCK_TIMEOUT};

/// Contexts older than this warn on read.
pub const STALENESS_HOURS: i64 = 48;

pub fn acquire_store_lock(layout: &RepoLayout) -> Result<FileLock, WorkflowError> {
    std::fs::create_dir_all(layout.context_root())?;
    FileLock::acquire(&layout.context_store_lock(), LOCK_TIMEOUT)
}

/// Normalize scope patterns to directory prefixes:
/// - a file path (last component has an extension) becomes its directory;
/// - a glob keeps its stable prefix (up to the first meta-character),
///   truncated at the last `/`;
/// - prefixes covered by a shorter kept prefix are dropped;
/// - the result is sorted and deduplicated.
///
/// The normalization is idempotent and order-independent, which makes the
/// scope hash canonical.
pub fn normalize_repo_paths(paths: &[String]) -> Vec<String> {
    let mut prefixes: Vec<String> = Vec::new();

    for raw in paths {
        let mut pattern = raw.trim().trim_start_matches("./").to_string();
        if pattern.is_empty() {
            continue;
        }

        if let Some(meta) = pattern.find(|c| matches!(c, '*' | '?' | '[')) {
            let stable = &pattern[..meta];
            pattern = match stable.rfind('/') {
                Some(slash) => stable[..slash].to_string(),
                None => String::new(),
            };
        } else if looks_like_file(&pattern) {
            pattern = match pattern.rfind('/') {
                Some(slash) => pattern[..slash].to_string(),
                None => String::new(),
            };
        }

        let pattern = pattern.trim_end_matches('/').to_string();
        if !pattern.is_empty() {
            prefixes.push(pattern);
        }
    }

    prefixes.sort();
    prefixes.dedup();

    // Drop prefixes already covered by a shorter one.
    let mut kept: Vec<String> = Vec::new();
    for prefix in prefixes {
        let covered = kept
            .iter()
            .any(|k| prefix == *k || prefix.starts_with(&format!("{k}/")));
        if !covered {
            kept.push(prefix);
        }
    }
    kept
}

fn looks_like_file(pattern: &str) -> bool {
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    // A dot in the last component (not leading) reads as an extension.
    last.char_indices().any(|(i, c)| c == '.' && i > 0)
}

/// SHA-256 over the canonical newline-joined scope.
pub fn scope_hash(repo_paths: &[String]) -> String {
    let normalized = normalize_repo_paths(repo_paths);
    sha256_hex(normalized.join("\n").as_bytes())
}

/// Pathspec form of the normalized scope for git commands.
pub fn scope_pathspec(repo_paths: &[String]) -> Vec<String> {
    normalize_repo_paths(repo_paths)
        .into_iter()
        .map(|p| format!("{p}/"))
        .collect()
}

/// Warn (never fail) when the recorded HEAD differs from the current one
/// or the context is older than [`STALENESS_HOURS`].
pub fn staleness_warnings(
    layout: &RepoLayout,
    git: &GitCli,
    recorded_head: &str,
    created_at: &str,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Ok(current) = repo::head_sha(&layout.repo_root, git) {
        if current != recorded_head {
            warnings.push(format!(
                "context was created at {} but HEAD is now {}; diffs may not line up",
                short(recorded_head),
                short(&current)
            ));
        }
    }

    if let Ok(created) = DateTime::parse_from_rfc3339(created_at) {
        let age = Utc::now().signed_duration_since(created.with_timezone(&Utc));
        if age.num_hours() > STALENESS_HOURS {
            warnings.push(format!(
                "context is {} hours old; consider rebuilding if task requirements changed",
                age.num_hours()
            ));
        }
    }

    for message in &warnings {
        warn!("{message}");
    }
    warnings
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}

/// Relative rendering used everywhere a path lands in a JSON document.
pub fn repo_relative(layout: &RepoLayout, path: &Path) -> String {
    layout.relative(path).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_paths_collapse_to_directories() {
        let normalized = normalize_repo_paths(&[
            "backend/src/upload/handler.ts".to_string(),
            "backend/src/upload".to_string(),
        ]);
        assert_eq!(normalized, vec!["backend/src/upload".to_string()]);
    }

    #[test]
    fn globs_keep_their_stable_prefix() {
        let normalized = normalize_repo_paths(&["mobile/src/**/*.tsx".to_string()]);
        assert_eq!(normalized, vec!["mobile/src".to_string()]);
    }

    #[test]
    fn normalization_is_idempotent_and_order_independent() {
        let input = vec![
            "shared/contracts/schema.ts".to_string(),
            "backend/src/**".to_string(),
            "backend/src/upload/handler.ts".to_string(),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let once = normalize_repo_paths(&input);
        let twice = normalize_repo_paths(&once);
        let other_order = normalize_repo_paths(&reversed);

        assert_eq!(once, twice);
        assert_eq!(once, other_order);
    }

    #[test]
    fn covered_prefixes_are_dropped() {
        let normalized = normalize_repo_paths(&[
            "backend".to_string(),
            "backend/src".to_string(),
            "mobile".to_string(),
        ]);
        assert_eq!(normalized, vec!["backend".to_string(), "mobile".to_string()]);
    }

    #[test]
    fn scope_hash_is_stable_across_orderings() {
        let a = scope_hash(&["b/src".to_string(), "a/src/main.ts".to_string()]);
        let b = scope_hash(&["a/src/main.ts".to_string(), "b/src".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
