//! Deterministic JSON serialization and atomic writes.
//!
//! One boundary for every JSON document this tool owns: keys sorted,
//! two-space indent, trailing newline, temp-file + fsync + rename.

use std::path::Path;

use serde::Serialize;

use warden_core::WorkflowError;

/// Serialize with sorted keys and a trailing newline. `serde_json`'s
/// default map is ordered, so a round-trip through `Value` sorts every
/// object's keys.
pub fn to_sorted_string<T: Serialize>(value: &T) -> Result<String, WorkflowError> {
    let value = serde_json::to_value(value)?;
    let mut rendered = serde_json::to_string_pretty(&value)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write `content` to `path` atomically: temp file in the same directory,
/// fsync, rename over the target.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), WorkflowError> {
    let parent = path
        .parent()
        .ok_or_else(|| WorkflowError::io(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp.as_file(), content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|err| WorkflowError::io(format!("atomic rename failed: {}", err.error)))?;
    Ok(())
}

/// Serialize + atomic write in one step.
pub fn write_sorted<T: Serialize>(path: &Path, value: &T) -> Result<(), WorkflowError> {
    atomic_write(path, &to_sorted_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_come_out_sorted() {
        let rendered = to_sorted_string(&json!({"zeta": 1, "alpha": {"b": 2, "a": 1}})).unwrap();
        let alpha = rendered.find("\"alpha\"").unwrap();
        let zeta = rendered.find("\"zeta\"").unwrap();
        assert!(alpha < zeta);
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        atomic_write(&path, "one\n").unwrap();
        atomic_write(&path, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\n");
    }

    #[test]
    fn byte_identical_across_runs() {
        let value = json!({"b": [3, 2], "a": "x"});
        assert_eq!(
            to_sorted_string(&value).unwrap(),
            to_sorted_string(&value).unwrap()
        );
    }
}
