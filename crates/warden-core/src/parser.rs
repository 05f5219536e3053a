//! YAML parser and filesystem discovery for `*.task.yaml` files.
//!
//! Both the inline (`blocked_by: [A, B]`) and the block list shapes are
//! accepted. Files missing any of the mandatory fields are skipped with a
//! warning; discovery never aborts on a single bad file.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde_yaml::Value;
use tracing::warn;

use crate::hash::sha256_hex;
use crate::layout::RepoLayout;
use crate::types::{Task, TaskId, TaskStatus};

pub struct TaskParser {
    layout: RepoLayout,
}

impl TaskParser {
    pub fn new(layout: RepoLayout) -> Self {
        Self { layout }
    }

    /// Parse one task file. Returns `None` (with a warning) on malformed
    /// YAML or missing mandatory fields.
    pub fn parse_file(&self, path: &Path) -> Option<Task> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to read {}: {err}", path.display());
                return None;
            }
        };

        let doc: Value = match serde_yaml::from_str(&content) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("failed to parse {}: {err}", path.display());
                return None;
            }
        };

        let map = match doc.as_mapping() {
            Some(map) => map,
            None => {
                warn!("skipping {}: not a YAML mapping", path.display());
                return None;
            }
        };

        let id = non_empty_string(map.get("id"))?;
        let title = non_empty_string(map.get("title"));
        let status = non_empty_string(map.get("status"));
        let priority = non_empty_string(map.get("priority"));
        let area = non_empty_string(map.get("area"));
        let (title, status, priority, area) = match (title, status, priority, area) {
            (Some(t), Some(s), Some(p), Some(a)) => (t, s, p, a),
            _ => {
                warn!(
                    "skipping {}: missing one of id, title, status, priority, area",
                    path.display()
                );
                return None;
            }
        };

        let schema_version = match map.get("schema_version") {
            None | Some(Value::Null) => "1.0".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => format!("{other:?}"),
        };

        let unblocker = map
            .get("unblocker")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let order = coerce_order(map.get("order"));

        let blocked_reason = match map.get("blocked_reason") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };

        let blocked_by = string_list(map.get("blocked_by"));
        let depends_on = string_list(map.get("depends_on"));

        let mtime = file_mtime_ms(path).unwrap_or(0);

        Some(Task {
            id: TaskId(id),
            title,
            status,
            priority,
            area,
            path: path.to_path_buf(),
            schema_version,
            unblocker,
            order,
            blocked_by: blocked_by.into_iter().map(TaskId).collect(),
            depends_on: depends_on.into_iter().map(TaskId).collect(),
            blocked_reason,
            mtime,
            hash: sha256_hex(content.as_bytes()),
        })
    }

    /// Walk `tasks/**/*.task.yaml` and `docs/completed-tasks/**/*.task.yaml`.
    /// Archived tasks with a status other than `completed` warn but are
    /// still returned so dependency resolution sees them.
    pub fn discover_tasks(&self) -> Vec<Task> {
        let mut tasks = Vec::new();

        for task in self.walk(&self.layout.tasks_dir()) {
            tasks.push(task);
        }

        for task in self.walk(&self.layout.archive_dir()) {
            if task.status != TaskStatus::Completed.as_str() {
                warn!(
                    "archived task {} has status '{}' but should be 'completed'",
                    task.id, task.status
                );
            }
            tasks.push(task);
        }

        tasks
    }

    /// Every `*.task.yaml` path currently on disk, parsed or not.
    /// Used by the datastore to detect files the cache has never seen.
    pub fn discover_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for dir in [self.layout.tasks_dir(), self.layout.archive_dir()] {
            paths.extend(glob_task_files(&dir));
        }
        paths
    }

    fn walk(&self, dir: &Path) -> Vec<Task> {
        glob_task_files(dir)
            .iter()
            .filter_map(|path| self.parse_file(path))
            .collect()
    }
}

fn glob_task_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let pattern = format!("{}/**/*.task.yaml", dir.display());
    match glob::glob(&pattern) {
        Ok(entries) => entries.filter_map(Result::ok).collect(),
        Err(err) => {
            warn!("bad glob pattern {pattern}: {err}");
            Vec::new()
        }
    }
}

pub fn file_mtime_ms(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts a YAML sequence, a bare scalar string, or nothing.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn coerce_order(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_repo() -> (tempfile::TempDir, TaskParser) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tasks/backend")).unwrap();
        fs::create_dir_all(dir.path().join("docs/completed-tasks")).unwrap();
        let parser = TaskParser::new(RepoLayout::new(dir.path()));
        (dir, parser)
    }

    fn write_task(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_inline_and_block_lists() {
        let (dir, parser) = fixture_repo();
        let path = write_task(
            dir.path(),
            "tasks/backend/TASK-0001.task.yaml",
            "id: TASK-0001\n\
             title: Wire the uploader\n\
             status: todo\n\
             priority: P1\n\
             area: backend\n\
             blocked_by: [TASK-0000, TASK-0002]\n\
             depends_on:\n  - TASK-0003\n  - TASK-0004\n",
        );

        let task = parser.parse_file(&path).unwrap();
        assert_eq!(task.id, TaskId::from("TASK-0001"));
        assert_eq!(
            task.blocked_by,
            vec![TaskId::from("TASK-0000"), TaskId::from("TASK-0002")]
        );
        assert_eq!(
            task.depends_on,
            vec![TaskId::from("TASK-0003"), TaskId::from("TASK-0004")]
        );
        assert_eq!(task.schema_version, "1.0");
        assert!(!task.unblocker);
        assert!(task.mtime > 0);
        assert_eq!(task.hash.len(), 64);
    }

    #[test]
    fn missing_mandatory_field_skips_file() {
        let (dir, parser) = fixture_repo();
        let path = write_task(
            dir.path(),
            "tasks/backend/TASK-0002.task.yaml",
            "id: TASK-0002\ntitle: No status\npriority: P0\narea: backend\n",
        );
        assert!(parser.parse_file(&path).is_none());
    }

    #[test]
    fn malformed_yaml_skips_file() {
        let (dir, parser) = fixture_repo();
        let path = write_task(
            dir.path(),
            "tasks/backend/TASK-0003.task.yaml",
            "id: [unclosed\n",
        );
        assert!(parser.parse_file(&path).is_none());
    }

    #[test]
    fn order_coerces_to_integer_or_none() {
        let (dir, parser) = fixture_repo();
        let path = write_task(
            dir.path(),
            "tasks/backend/TASK-0004.task.yaml",
            "id: TASK-0004\ntitle: t\nstatus: todo\npriority: P2\narea: backend\norder: \"7\"\n",
        );
        assert_eq!(parser.parse_file(&path).unwrap().order, Some(7));

        let path = write_task(
            dir.path(),
            "tasks/backend/TASK-0005.task.yaml",
            "id: TASK-0005\ntitle: t\nstatus: todo\npriority: P2\narea: backend\norder: nope\n",
        );
        assert_eq!(parser.parse_file(&path).unwrap().order, None);
    }

    #[test]
    fn discovery_includes_archive() {
        let (dir, parser) = fixture_repo();
        write_task(
            dir.path(),
            "tasks/backend/TASK-0010.task.yaml",
            "id: TASK-0010\ntitle: active\nstatus: todo\npriority: P1\narea: backend\n",
        );
        write_task(
            dir.path(),
            "docs/completed-tasks/TASK-0009.task.yaml",
            "id: TASK-0009\ntitle: done\nstatus: completed\npriority: P1\narea: backend\n",
        );

        let tasks = parser.discover_tasks();
        assert_eq!(tasks.len(), 2);
        let archived = tasks.iter().find(|t| t.id.as_str() == "TASK-0009").unwrap();
        assert!(archived.in_archive());
    }

    #[test]
    fn scalar_blocked_by_becomes_single_entry() {
        let (dir, parser) = fixture_repo();
        let path = write_task(
            dir.path(),
            "tasks/backend/TASK-0011.task.yaml",
            "id: TASK-0011\ntitle: t\nstatus: todo\npriority: P1\narea: backend\nblocked_by: TASK-0001\n",
        );
        let task = parser.parse_file(&path).unwrap();
        assert_eq!(task.blocked_by, vec![TaskId::from("TASK-0001")]);
    }
}
