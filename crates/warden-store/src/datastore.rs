//! Persistent JSON cache of parsed tasks.
//!
//! The cache lives at `tasks/.cache/tasks_index.json` and is invalidated
//! whenever a cached file disappears, any mtime diverges from disk, or a
//! task file exists that the cache has never seen.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use warden_core::parser::file_mtime_ms;
use warden_core::types::{Task, TaskId};
use warden_core::{RepoLayout, TaskParser, WorkflowError};

use crate::json;
use crate::lock::{FileLock, LOCK_TIMEOUT};

pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedTask {
    path: PathBuf,
    title: String,
    status: String,
    priority: String,
    area: String,
    #[serde(default = "default_schema_version")]
    schema_version: String,
    #[serde(default)]
    unblocker: bool,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    blocked_by: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    blocked_reason: Option<String>,
    mtime: i64,
    #[serde(default)]
    hash: String,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    generated_at: String,
    tasks: BTreeMap<String, CachedTask>,
    archives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    pub exists: bool,
    pub version: Option<u32>,
    pub generated_at: Option<String>,
    pub task_count: usize,
    pub archive_count: usize,
}

pub struct Datastore {
    layout: RepoLayout,
    parser: TaskParser,
}

impl Datastore {
    pub fn new(layout: RepoLayout) -> Self {
        let parser = TaskParser::new(layout.clone());
        Self { layout, parser }
    }

    /// Load the current task set, rehydrating from the cache when it is
    /// still valid, otherwise rediscovering from disk and rewriting it.
    pub fn load_tasks(&self, force_refresh: bool) -> Result<Vec<Task>, WorkflowError> {
        std::fs::create_dir_all(self.layout.cache_dir())?;
        let _lock = FileLock::acquire(&self.layout.cache_lock(), LOCK_TIMEOUT)?;

        if !force_refresh {
            if let Some(tasks) = self.load_from_cache() {
                return Ok(tasks);
            }
        }

        let tasks = self.parser.discover_tasks();
        self.save_to_cache(&tasks)?;
        Ok(tasks)
    }

    pub fn cache_info(&self) -> CacheInfo {
        let path = self.layout.cache_file();
        if !path.exists() {
            return CacheInfo {
                exists: false,
                version: None,
                generated_at: None,
                task_count: 0,
                archive_count: 0,
            };
        }
        match std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<CacheDocument>(&raw).ok())
        {
            Some(doc) => CacheInfo {
                exists: true,
                version: Some(doc.version),
                generated_at: Some(doc.generated_at),
                task_count: doc.tasks.len(),
                archive_count: doc.archives.len(),
            },
            None => CacheInfo {
                exists: true,
                version: None,
                generated_at: None,
                task_count: 0,
                archive_count: 0,
            },
        }
    }

    /// Monotonic audit counter, bumped under the cache lock. Returned by
    /// `pick` so a selection can be correlated with a cache generation.
    pub fn next_snapshot_id(&self) -> Result<u64, WorkflowError> {
        std::fs::create_dir_all(self.layout.cache_dir())?;
        let _lock = FileLock::acquire(&self.layout.cache_lock(), LOCK_TIMEOUT)?;

        let counter_path = self.layout.snapshot_counter();
        let current: u64 = std::fs::read_to_string(&counter_path)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        json::atomic_write(&counter_path, &format!("{next}\n"))?;
        Ok(next)
    }

    /// `None` means stale: rebuild and rewrite.
    fn load_from_cache(&self) -> Option<Vec<Task>> {
        let raw = std::fs::read_to_string(self.layout.cache_file()).ok()?;
        let doc: CacheDocument = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("cache invalid ({err}), rebuilding");
                return None;
            }
        };

        if doc.version != CACHE_VERSION {
            return None;
        }

        let mut tasks = Vec::with_capacity(doc.tasks.len());
        for (id, cached) in &doc.tasks {
            if !cached.path.exists() {
                return None;
            }
            let mtime = file_mtime_ms(&cached.path)?;
            if mtime != cached.mtime {
                return None;
            }
            tasks.push(Task {
                id: TaskId(id.clone()),
                title: cached.title.clone(),
                status: cached.status.clone(),
                priority: cached.priority.clone(),
                area: cached.area.clone(),
                path: cached.path.clone(),
                schema_version: cached.schema_version.clone(),
                unblocker: cached.unblocker,
                order: cached.order,
                blocked_by: cached.blocked_by.iter().cloned().map(TaskId).collect(),
                depends_on: cached.depends_on.iter().cloned().map(TaskId).collect(),
                blocked_reason: cached.blocked_reason.clone(),
                mtime: cached.mtime,
                hash: cached.hash.clone(),
            });
        }

        // Any on-disk task file the cache has never seen makes it stale.
        let cached_paths: std::collections::BTreeSet<&PathBuf> =
            doc.tasks.values().map(|t| &t.path).collect();
        for path in self.parser.discover_paths() {
            if !cached_paths.contains(&path) {
                return None;
            }
        }

        Some(tasks)
    }

    fn save_to_cache(&self, tasks: &[Task]) -> Result<(), WorkflowError> {
        let mut task_map = BTreeMap::new();
        let mut archives = Vec::new();

        for task in tasks {
            task_map.insert(
                task.id.0.clone(),
                CachedTask {
                    path: task.path.clone(),
                    title: task.title.clone(),
                    status: task.status.clone(),
                    priority: task.priority.clone(),
                    area: task.area.clone(),
                    schema_version: task.schema_version.clone(),
                    unblocker: task.unblocker,
                    order: task.order,
                    blocked_by: task.blocked_by.iter().map(|t| t.0.clone()).collect(),
                    depends_on: task.depends_on.iter().map(|t| t.0.clone()).collect(),
                    blocked_reason: task.blocked_reason.clone(),
                    mtime: task.mtime,
                    hash: task.hash.clone(),
                },
            );
            if task.in_archive() {
                archives.push(task.id.0.clone());
            }
        }
        archives.sort();

        let doc = CacheDocument {
            version: CACHE_VERSION,
            generated_at: Utc::now().to_rfc3339(),
            tasks: task_map,
            archives,
        };
        json::write_sorted(&self.layout.cache_file(), &doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn fixture_repo() -> (tempfile::TempDir, Datastore) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tasks/backend")).unwrap();
        fs::create_dir_all(dir.path().join("docs/completed-tasks")).unwrap();
        let store = Datastore::new(RepoLayout::new(dir.path()));
        (dir, store)
    }

    fn write_task(root: &Path, rel: &str, id: &str, status: &str) {
        fs::write(
            root.join(rel),
            format!("id: {id}\ntitle: {id}\nstatus: {status}\npriority: P1\narea: backend\n"),
        )
        .unwrap();
    }

    #[test]
    fn cache_round_trip_yields_same_tasks() {
        let (dir, store) = fixture_repo();
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "todo");
        write_task(
            dir.path(),
            "docs/completed-tasks/b.task.yaml",
            "TASK-0000",
            "completed",
        );

        let first = store.load_tasks(false).unwrap();
        assert!(dir.path().join("tasks/.cache/tasks_index.json").exists());

        let second = store.load_tasks(false).unwrap();
        let mut first_ids: Vec<_> = first.iter().map(|t| t.id.0.clone()).collect();
        let mut second_ids: Vec<_> = second.iter().map(|t| t.id.0.clone()).collect();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);

        let info = store.cache_info();
        assert!(info.exists);
        assert_eq!(info.version, Some(CACHE_VERSION));
        assert_eq!(info.task_count, 2);
        assert_eq!(info.archive_count, 1);
    }

    #[test]
    fn new_file_invalidates_cache() {
        let (dir, store) = fixture_repo();
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "todo");
        store.load_tasks(false).unwrap();

        write_task(dir.path(), "tasks/backend/b.task.yaml", "TASK-0002", "todo");
        let tasks = store.load_tasks(false).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn removed_file_invalidates_cache() {
        let (dir, store) = fixture_repo();
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "todo");
        write_task(dir.path(), "tasks/backend/b.task.yaml", "TASK-0002", "todo");
        store.load_tasks(false).unwrap();

        fs::remove_file(dir.path().join("tasks/backend/b.task.yaml")).unwrap();
        let tasks = store.load_tasks(false).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.0, "TASK-0001");
    }

    #[test]
    fn modified_file_invalidates_cache() {
        let (dir, store) = fixture_repo();
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "todo");
        store.load_tasks(false).unwrap();

        // Rewrite with a new status and a bumped mtime.
        let path = dir.path().join("tasks/backend/a.task.yaml");
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "blocked");
        let bumped = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(bumped).unwrap();

        let tasks = store.load_tasks(false).unwrap();
        assert_eq!(tasks[0].status, "blocked");
    }

    #[test]
    fn corrupted_cache_rebuilds() {
        let (dir, store) = fixture_repo();
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "todo");
        store.load_tasks(false).unwrap();

        fs::write(dir.path().join("tasks/.cache/tasks_index.json"), "{nope").unwrap();
        let tasks = store.load_tasks(false).unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn cache_json_is_byte_stable() {
        let (dir, store) = fixture_repo();
        write_task(dir.path(), "tasks/backend/a.task.yaml", "TASK-0001", "todo");
        store.load_tasks(true).unwrap();
        let first = fs::read_to_string(dir.path().join("tasks/.cache/tasks_index.json")).unwrap();
        // Key order must be deterministic; only generated_at may differ.
        let keys = |raw: &str| -> Vec<String> {
            raw.lines()
                .filter(|l| l.trim_start().starts_with('"'))
                .map(|l| l.trim().to_string())
                .filter(|l| !l.starts_with("\"generated_at\""))
                .collect()
        };
        store.load_tasks(true).unwrap();
        let second = fs::read_to_string(dir.path().join("tasks/.cache/tasks_index.json")).unwrap();
        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn snapshot_counter_is_monotonic() {
        let (_dir, store) = fixture_repo();
        let a = store.next_snapshot_id().unwrap();
        let b = store.next_snapshot_id().unwrap();
        assert_eq!(b, a + 1);
    }
}
