//! Immutable snapshot building: the frozen task snapshot, standards
//! excerpt extraction with freshness tracking, and the provenance
//! manifest.

use std::path::Path;

use chrono::Utc;
use serde_yaml::Value;

use warden_core::hash::{sha256_file, sha256_hex};
use warden_core::types::TaskId;
use warden_core::{RepoLayout, WorkflowError};

use crate::context::models::{
    ContextManifest, ExcerptIndex, ImmutableContext, RetryPolicy, SourceFile, StandardsCitation,
    StandardsExcerpt, TaskSnapshot, ValidationBaseline, ValidationCommand,
    MANIFEST_SCHEMA_VERSION,
};
use crate::context::runtime;
use crate::json;

/// Maximum length of the one-line `requirement` summary.
const REQUIREMENT_MAX_CHARS: usize = 140;

pub struct ImmutableBuilder<'a> {
    layout: &'a RepoLayout,
}

impl<'a> ImmutableBuilder<'a> {
    pub fn new(layout: &'a RepoLayout) -> Self {
        Self { layout }
    }

    /// Build the immutable payload from a task file. Returns the payload
    /// plus the list of schema gaps (empty scope, missing plan, …); the
    /// caller decides whether gaps are fatal.
    pub fn build_from_task_file(
        &self,
        task_path: &Path,
    ) -> Result<(ImmutableContext, Vec<String>), WorkflowError> {
        let content = std::fs::read_to_string(task_path).map_err(|err| {
            WorkflowError::io(format!("cannot read {}: {err}", task_path.display()))
        })?;
        let doc: Value = serde_yaml::from_str(&content).map_err(|err| {
            WorkflowError::validation(format!("invalid YAML in {}: {err}", task_path.display()))
        })?;
        let map = doc.as_mapping().ok_or_else(|| {
            WorkflowError::validation(format!("{} is not a YAML mapping", task_path.display()))
        })?;

        let scope = map.get("scope").and_then(Value::as_mapping);
        let scope_in = scope
            .and_then(|s| s.get("in"))
            .map(string_seq)
            .unwrap_or_default();
        let scope_out = scope
            .and_then(|s| s.get("out"))
            .map(string_seq)
            .unwrap_or_default();
        let acceptance_criteria = map
            .get("acceptance_criteria")
            .map(string_seq)
            .unwrap_or_default();
        let plan_steps = map.get("plan").map(string_seq).unwrap_or_default();
        let deliverables = map.get("deliverables").map(string_seq).unwrap_or_default();

        let validation = map.get("validation").and_then(Value::as_mapping);
        let pipeline = validation
            .and_then(|v| v.get("pipeline").or_else(|| v.get("commands")))
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default();
        let (qa_commands, validation_commands) = normalize_validation_pipeline(&pipeline);

        let context_block = map.get("context").and_then(Value::as_mapping);
        let repo_paths = context_block
            .and_then(|c| c.get("repo_paths"))
            .map(string_seq)
            .unwrap_or_default();

        let mut gaps = Vec::new();
        if acceptance_criteria.is_empty() {
            gaps.push("acceptance_criteria is empty".to_string());
        }
        if scope_in.is_empty() {
            gaps.push("scope.in is empty".to_string());
        }
        if scope_out.is_empty() {
            gaps.push("scope.out is empty".to_string());
        }
        if plan_steps.is_empty() {
            gaps.push("plan is empty".to_string());
        }
        if deliverables.is_empty() {
            gaps.push("deliverables is empty".to_string());
        }
        if validation_commands.is_empty() {
            gaps.push("validation.pipeline is empty".to_string());
        }

        let snapshot = TaskSnapshot {
            title: string_field(map.get("title")),
            priority: string_field_or(map.get("priority"), "P1"),
            area: string_field(map.get("area")),
            description: string_field(map.get("description")),
            scope_in,
            scope_out,
            acceptance_criteria,
            plan_steps,
            deliverables,
            validation_commands,
            snapshot_path: None,
            snapshot_sha256: None,
            original_path: None,
            completed_path: None,
            created_at: None,
        };

        let immutable = ImmutableContext {
            task_snapshot: snapshot,
            standards_citations: Vec::new(),
            validation_baseline: ValidationBaseline {
                commands: qa_commands,
                qa_results: None,
            },
            repo_paths: runtime::normalize_repo_paths(&repo_paths),
        };

        Ok((immutable, gaps))
    }

    /// `related_docs` entries under `standards/` cited by the task file.
    pub fn related_standards(&self, task_path: &Path) -> Vec<String> {
        let Ok(content) = std::fs::read_to_string(task_path) else {
            return Vec::new();
        };
        let Ok(doc) = serde_yaml::from_str::<Value>(&content) else {
            return Vec::new();
        };
        doc.as_mapping()
            .and_then(|m| m.get("context"))
            .and_then(Value::as_mapping)
            .and_then(|c| c.get("related_docs"))
            .map(string_seq)
            .unwrap_or_default()
            .into_iter()
            .filter(|doc| doc.starts_with("standards/"))
            .collect()
    }

    /// Byte-for-byte copy of the task file into the context directory,
    /// returning updated snapshot metadata fields.
    pub fn create_task_snapshot(
        &self,
        task_id: &TaskId,
        task_path: &Path,
    ) -> Result<TaskSnapshotMetadata, WorkflowError> {
        let content = std::fs::read(task_path)
            .map_err(|err| WorkflowError::io(format!("cannot read {}: {err}", task_path.display())))?;
        let sha256 = sha256_hex(&content);

        let snapshot_path = self.layout.task_snapshot_file(task_id);
        std::fs::create_dir_all(self.layout.context_dir(task_id))?;
        std::fs::write(&snapshot_path, &content)?;

        let file_name = task_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.task.yaml", task_id.0));

        Ok(TaskSnapshotMetadata {
            snapshot_path: runtime::repo_relative(self.layout, &snapshot_path),
            sha256,
            original_path: runtime::repo_relative(self.layout, task_path),
            completed_path: format!("docs/completed-tasks/{file_name}"),
            created_at: Utc::now().to_rfc3339(),
        })
    }

    /// Write the provenance manifest for a freshly initialized context.
    pub fn write_manifest(
        &self,
        task_id: &TaskId,
        source_files: Vec<SourceFile>,
        context_schema_version: u32,
    ) -> Result<ContextManifest, WorkflowError> {
        let manifest = ContextManifest {
            version: MANIFEST_SCHEMA_VERSION,
            context_schema_version,
            source_files,
        };
        json::write_sorted(&self.layout.manifest_file(task_id), &manifest)?;
        Ok(manifest)
    }

    pub fn read_manifest(&self, task_id: &TaskId) -> Result<Option<ContextManifest>, WorkflowError> {
        let path = self.layout.manifest_file(task_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&raw)
            .map_err(|err| WorkflowError::validation(format!("invalid manifest: {err}")))?;
        Ok(Some(manifest))
    }

    /// Manifest source files whose on-disk content no longer matches.
    pub fn detect_source_changes(&self, manifest: &ContextManifest) -> Vec<String> {
        let mut changes = Vec::new();
        for source in &manifest.source_files {
            let path = self.layout.repo_root.join(&source.path);
            if !path.exists() {
                changes.push(format!("Missing: {}", source.path));
                continue;
            }
            match sha256_file(&path) {
                Ok(sha) if sha == source.sha256 => {}
                Ok(_) => changes.push(format!("Modified: {}", source.path)),
                Err(_) => changes.push(format!("Unreadable: {}", source.path)),
            }
        }
        changes
    }

    /// Extract the section under `heading` from a standards file, cache it
    /// under the task's evidence tree, and record it in the excerpt index.
    pub fn extract_standards_excerpt(
        &self,
        task_id: &TaskId,
        standards_file: &str,
        section_heading: &str,
    ) -> Result<StandardsExcerpt, WorkflowError> {
        let full_path = self.layout.repo_root.join(standards_file);
        let content = std::fs::read_to_string(&full_path).map_err(|_| {
            WorkflowError::io(format!("standards file not found: {standards_file}"))
        })?;

        let (heading_line, start, end) = find_section_boundaries(&content, section_heading)
            .ok_or_else(|| {
                WorkflowError::validation(format!(
                    "section not found: '{section_heading}' in {standards_file}"
                ))
            })?;

        let lines: Vec<&str> = content.lines().collect();
        let body = trim_blank_edges(&lines[start..end]);
        let cached_content = if body.is_empty() {
            String::new()
        } else {
            format!("{}\n", body.join("\n"))
        };

        let normalized = normalize_excerpt_content(&body);
        let content_sha256 = sha256_hex(normalized.as_bytes());
        let excerpt_id = content_sha256[..8].to_string();

        let excerpt_dir = self.layout.standards_excerpt_dir(task_id);
        let cached_file = excerpt_dir.join(format!("{excerpt_id}.md"));
        json::atomic_write(&cached_file, &cached_content)?;

        let excerpt = StandardsExcerpt {
            file: standards_file.to_string(),
            section: section_heading.to_string(),
            requirement: summarize_requirement(&body),
            line_span: (heading_line + 1, end),
            content_sha256,
            excerpt_id,
            cached_path: runtime::repo_relative(self.layout, &cached_file),
            extracted_at: Utc::now().to_rfc3339(),
        };

        let index_path = self.layout.standards_excerpt_index(task_id);
        let mut index = self.read_excerpt_index(task_id)?;
        index
            .excerpts
            .retain(|e| !(e.file == excerpt.file && e.section == excerpt.section));
        index.excerpts.push(excerpt.clone());
        index.excerpts.sort_by(|a, b| a.excerpt_id.cmp(&b.excerpt_id));
        json::write_sorted(&index_path, &index)?;

        Ok(excerpt)
    }

    /// `false` when the source file is gone, the section disappeared, or
    /// its normalized content hash changed.
    pub fn verify_excerpt_freshness(&self, excerpt: &StandardsExcerpt) -> bool {
        let full_path = self.layout.repo_root.join(&excerpt.file);
        let Ok(content) = std::fs::read_to_string(&full_path) else {
            return false;
        };
        let Some((_, start, end)) = find_section_boundaries(&content, &excerpt.section) else {
            return false;
        };
        let lines: Vec<&str> = content.lines().collect();
        let body = trim_blank_edges(&lines[start..end]);
        sha256_hex(normalize_excerpt_content(&body).as_bytes()) == excerpt.content_sha256
    }

    /// Remove stale cached excerpts and prune the index; returns the
    /// removed excerpt ids.
    pub fn invalidate_stale_excerpts(&self, task_id: &TaskId) -> Result<Vec<String>, WorkflowError> {
        let mut index = self.read_excerpt_index(task_id)?;
        if index.excerpts.is_empty() {
            return Ok(Vec::new());
        }

        let mut stale = Vec::new();
        let mut fresh = Vec::new();
        for excerpt in index.excerpts.drain(..) {
            if self.verify_excerpt_freshness(&excerpt) {
                fresh.push(excerpt);
            } else {
                let cached = self.layout.repo_root.join(&excerpt.cached_path);
                let _ = std::fs::remove_file(cached);
                stale.push(excerpt.excerpt_id);
            }
        }
        index.excerpts = fresh;
        json::write_sorted(&self.layout.standards_excerpt_index(task_id), &index)?;
        Ok(stale)
    }

    pub fn read_excerpt_index(&self, task_id: &TaskId) -> Result<ExcerptIndex, WorkflowError> {
        let path = self.layout.standards_excerpt_index(task_id);
        if !path.exists() {
            return Ok(ExcerptIndex::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|err| WorkflowError::validation(format!("invalid excerpt index: {err}")))
    }

    /// Enrich citations with freshly extracted excerpts. Extraction
    /// failures leave the bare citation in place rather than failing init.
    pub fn enrich_citations(
        &self,
        task_id: &TaskId,
        citations: Vec<StandardsCitation>,
    ) -> Vec<StandardsCitation> {
        citations
            .into_iter()
            .map(|citation| {
                match self.extract_standards_excerpt(task_id, &citation.file, &citation.section) {
                    Ok(excerpt) => excerpt.to_citation(),
                    Err(err) => {
                        tracing::warn!(
                            "failed to extract excerpt for {}#{}: {err}",
                            citation.file,
                            citation.section
                        );
                        citation
                    }
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshotMetadata {
    pub snapshot_path: String,
    pub sha256: String,
    pub original_path: String,
    pub completed_path: String,
    pub created_at: String,
}

/// Locate a markdown section by heading. Returns
/// `(heading_line_idx, body_start_idx, body_end_idx)` where the body ends
/// at the next heading of the same or higher level, or EOF.
pub fn find_section_boundaries(content: &str, heading: &str) -> Option<(usize, usize, usize)> {
    let lines: Vec<&str> = content.lines().collect();
    let wanted = normalize_heading(heading);

    for (idx, line) in lines.iter().enumerate() {
        let Some((level, text)) = parse_heading(line) else {
            continue;
        };
        if normalize_heading(text) != wanted {
            continue;
        }

        let start = idx + 1;
        let mut end = lines.len();
        for (offset, candidate) in lines[start..].iter().enumerate() {
            if let Some((candidate_level, _)) = parse_heading(candidate) {
                if candidate_level <= level {
                    end = start + offset;
                    break;
                }
            }
        }
        return Some((idx, start, end));
    }
    None
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes, rest.trim()))
}

/// Lowercase, `&` → "and", punctuation stripped, whitespace and hyphens
/// collapsed to single spaces. This makes `edge-and-interface-layer`
/// match `Edge & Interface Layer`.
pub fn normalize_heading(text: &str) -> String {
    let lowered = text.to_lowercase().replace('&', " and ");
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn trim_blank_edges<'l>(lines: &[&'l str]) -> Vec<&'l str> {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

/// Identical content must hash identically regardless of incidental
/// whitespace: trailing whitespace is stripped per line and runs of blank
/// lines collapse to one.
pub fn normalize_excerpt_content(lines: &[&str]) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut previous_blank = false;
    for line in lines {
        let trimmed = line.trim_end();
        let blank = trimmed.is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(trimmed.to_string());
        previous_blank = blank;
    }
    out.join("\n")
}

/// First ≤140 characters of the section prose, whitespace-collapsed,
/// truncated with no ellipsis.
fn summarize_requirement(lines: &[&str]) -> String {
    let prose = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let collapsed = prose.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(REQUIREMENT_MAX_CHARS).collect()
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn string_field_or(value: Option<&Value>, default: &str) -> String {
    let s = string_field(value);
    if s.is_empty() {
        default.to_string()
    } else {
        s
    }
}

fn string_seq(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Normalize `validation.pipeline` into plain command strings plus the
/// full per-command records. Accepts bare strings and mappings.
fn normalize_validation_pipeline(pipeline: &[Value]) -> (Vec<String>, Vec<ValidationCommand>) {
    let mut qa_commands = Vec::new();
    let mut commands = Vec::new();

    for (idx, entry) in pipeline.iter().enumerate() {
        match entry {
            Value::String(command) => {
                qa_commands.push(command.clone());
                commands.push(ValidationCommand {
                    id: format!("val-{:03}", idx + 1),
                    command: command.clone(),
                    description: format!("Validation command {}", idx + 1),
                    cwd: ".".to_string(),
                    timeout_ms: Some(120_000),
                    retry_policy: RetryPolicy::default(),
                    criticality: "required".to_string(),
                    expected_exit_codes: vec![0],
                });
            }
            Value::Mapping(map) => {
                let command = string_field(map.get("command").or_else(|| map.get("cmd")));
                if command.is_empty() {
                    continue;
                }
                qa_commands.push(command.clone());

                let retry_policy = map
                    .get("retry_policy")
                    .and_then(Value::as_mapping)
                    .map(|rp| RetryPolicy {
                        max_attempts: rp
                            .get("max_attempts")
                            .and_then(Value::as_u64)
                            .unwrap_or(1) as u32,
                        backoff_ms: rp.get("backoff_ms").and_then(Value::as_u64).unwrap_or(1000),
                    })
                    .unwrap_or_default();

                commands.push(ValidationCommand {
                    id: string_field_or(map.get("id"), &format!("val-{:03}", idx + 1)),
                    command,
                    description: string_field(map.get("description")),
                    cwd: string_field_or(map.get("cwd"), "."),
                    timeout_ms: Some(
                        map.get("timeout_ms").and_then(Value::as_u64).unwrap_or(120_000),
                    ),
                    retry_policy,
                    criticality: string_field_or(map.get("criticality"), "required"),
                    expected_exit_codes: map
                        .get("expected_exit_codes")
                        .and_then(Value::as_sequence)
                        .map(|seq| {
                            seq.iter()
                                .filter_map(Value::as_i64)
                                .map(|v| v as i32)
                                .collect()
                        })
                        .unwrap_or_else(|| vec![0]),
                });
            }
            _ => {}
        }
    }

    (qa_commands, commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Backend Tier\n\n\
## Edge & Interface Layer\n\n\
**Framework**\n\n\
* NestJS modules.\n\n\
## Lambda Application Layer\n\n\
**Libraries**\n\n\
* Middy.\n\n\
### Nested Subsection\n\n\
Nested content.\n\n\
## Domain Service Layer\n\n\
* Result types.\n";

    fn fixture() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("standards")).unwrap();
        std::fs::write(dir.path().join("standards/backend-tier.md"), SAMPLE).unwrap();
        let layout = RepoLayout::new(dir.path());
        (dir, layout)
    }

    #[test]
    fn finds_sections_at_each_level() {
        let (_, body_start, end) =
            find_section_boundaries(SAMPLE, "Edge & Interface Layer").unwrap();
        let lines: Vec<&str> = SAMPLE.lines().collect();
        assert!(lines[end].starts_with("## Lambda Application Layer"));
        assert!(body_start < end);

        let (_, _, nested_end) = find_section_boundaries(SAMPLE, "Nested Subsection").unwrap();
        assert!(lines[nested_end].starts_with("## Domain Service Layer"));

        let (_, _, eof_end) = find_section_boundaries(SAMPLE, "Domain Service Layer").unwrap();
        assert_eq!(eof_end, lines.len());

        assert!(find_section_boundaries(SAMPLE, "Nonexistent Section").is_none());
    }

    #[test]
    fn heading_normalization_accepts_slug_form() {
        assert_eq!(
            normalize_heading("edge-and-interface-layer"),
            normalize_heading("Edge & Interface Layer")
        );
    }

    #[test]
    fn excerpt_extraction_caches_and_indexes() {
        let (dir, layout) = fixture();
        let builder = ImmutableBuilder::new(&layout);
        let task_id = TaskId::from("TASK-0001");

        let excerpt = builder
            .extract_standards_excerpt(&task_id, "standards/backend-tier.md", "Lambda Application Layer")
            .unwrap();

        assert_eq!(excerpt.excerpt_id.len(), 8);
        let cached = dir.path().join(&excerpt.cached_path);
        let cached_content = std::fs::read_to_string(&cached).unwrap();
        assert!(!cached_content.contains("## Lambda Application Layer"));
        assert!(cached_content.contains("**Libraries**"));

        let index = builder.read_excerpt_index(&task_id).unwrap();
        assert_eq!(index.excerpts.len(), 1);
        assert_eq!(index.excerpts[0].excerpt_id, excerpt.excerpt_id);
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = normalize_excerpt_content(&["Line 1.", "Line 2.", "", "", "Line 3."]);
        let b = normalize_excerpt_content(&["Line 1.", "Line 2.  ", "", "Line 3."]);
        assert_eq!(a, b);
    }

    #[test]
    fn freshness_flips_on_content_change() {
        let (dir, layout) = fixture();
        let builder = ImmutableBuilder::new(&layout);
        let task_id = TaskId::from("TASK-0001");

        let excerpt = builder
            .extract_standards_excerpt(&task_id, "standards/backend-tier.md", "Lambda Application Layer")
            .unwrap();
        assert!(builder.verify_excerpt_freshness(&excerpt));

        let path = dir.path().join("standards/backend-tier.md");
        let modified = SAMPLE.replace("* Middy.", "* Middy v3.");
        std::fs::write(&path, modified).unwrap();
        assert!(!builder.verify_excerpt_freshness(&excerpt));

        let stale = builder.invalidate_stale_excerpts(&task_id).unwrap();
        assert_eq!(stale, vec![excerpt.excerpt_id.clone()]);
        assert!(!dir.path().join(&excerpt.cached_path).exists());
    }

    #[test]
    fn freshness_false_when_file_deleted() {
        let (dir, layout) = fixture();
        let builder = ImmutableBuilder::new(&layout);
        let excerpt = builder
            .extract_standards_excerpt(
                &TaskId::from("TASK-0001"),
                "standards/backend-tier.md",
                "Domain Service Layer",
            )
            .unwrap();
        std::fs::remove_file(dir.path().join("standards/backend-tier.md")).unwrap();
        assert!(!builder.verify_excerpt_freshness(&excerpt));
    }

    #[test]
    fn requirement_is_truncated_prose() {
        let long_line = "word ".repeat(60);
        let lines: Vec<&str> = vec![&long_line];
        let requirement = summarize_requirement(&lines);
        assert!(requirement.chars().count() <= REQUIREMENT_MAX_CHARS);
        assert!(!requirement.ends_with('…'));
    }

    #[test]
    fn builds_immutable_payload_from_task_yaml() {
        let (dir, layout) = fixture();
        let task_path = dir.path().join("task.yaml");
        std::fs::write(
            &task_path,
            "id: TASK-0001\ntitle: Uploader\nstatus: todo\npriority: P0\narea: backend\n\
             scope:\n  in: [backend/src/upload]\n  out: [mobile]\n\
             acceptance_criteria: [works]\n\
             plan: [do it]\n\
             deliverables: [handler]\n\
             validation:\n  pipeline:\n    - pnpm lint\n    - command: pnpm test\n      id: tests\n      timeout_ms: 60000\n\
             context:\n  repo_paths: [backend/src/upload/handler.ts]\n",
        )
        .unwrap();

        let builder = ImmutableBuilder::new(&layout);
        let (immutable, gaps) = builder.build_from_task_file(&task_path).unwrap();
        assert!(gaps.is_empty());
        assert_eq!(immutable.validation_baseline.commands.len(), 2);
        assert_eq!(immutable.task_snapshot.validation_commands[0].id, "val-001");
        assert_eq!(immutable.task_snapshot.validation_commands[1].id, "tests");
        assert_eq!(
            immutable.task_snapshot.validation_commands[1].timeout_ms,
            Some(60_000)
        );
        assert_eq!(immutable.repo_paths, vec!["backend/src/upload".to_string()]);
    }

    #[test]
    fn empty_sections_report_gaps() {
        let (dir, layout) = fixture();
        let task_path = dir.path().join("task.yaml");
        std::fs::write(
            &task_path,
            "id: TASK-0002\ntitle: Bare\nstatus: todo\npriority: P1\narea: backend\n",
        )
        .unwrap();
        let builder = ImmutableBuilder::new(&layout);
        let (_, gaps) = builder.build_from_task_file(&task_path).unwrap();
        assert!(gaps.contains(&"acceptance_criteria is empty".to_string()));
        assert!(gaps.contains(&"validation.pipeline is empty".to_string()));
    }
}
