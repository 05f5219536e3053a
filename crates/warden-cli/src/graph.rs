//! Dependency graph over task ids.
//!
//! Two edge kinds: `blocked_by` (the blocking graph, the only one that
//! affects readiness) and `depends_on` (informational artifact edges).
//! A reverse index over the blocking graph answers "what does X block".

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use warden_core::types::{Task, TaskId};

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub tasks: Vec<Task>,
    pub task_by_id: HashMap<TaskId, Task>,
    blocked_by_edges: HashMap<TaskId, Vec<TaskId>>,
    depends_on_edges: HashMap<TaskId, Vec<TaskId>>,
    reverse_blocked_by: HashMap<TaskId, Vec<TaskId>>,
}

/// Sets returned by [`DependencyGraph::dependency_closure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    pub blocking: BTreeSet<TaskId>,
    pub artifacts: BTreeSet<TaskId>,
    pub transitive: BTreeSet<TaskId>,
}

impl DependencyGraph {
    pub fn new(tasks: Vec<Task>) -> Self {
        let task_by_id: HashMap<TaskId, Task> =
            tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();

        let mut blocked_by_edges = HashMap::new();
        let mut depends_on_edges = HashMap::new();
        let mut reverse_blocked_by: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

        for task in &tasks {
            blocked_by_edges.insert(task.id.clone(), task.blocked_by.clone());
            depends_on_edges.insert(task.id.clone(), task.depends_on.clone());
            for blocker in &task.blocked_by {
                reverse_blocked_by
                    .entry(blocker.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }

        Self {
            tasks,
            task_by_id,
            blocked_by_edges,
            depends_on_edges,
            reverse_blocked_by,
        }
    }

    /// Cycles in the blocking graph, found by DFS with a recursion stack.
    /// Each cycle is the slice of the current path from the repeated node
    /// onward, closed with the repeated node.
    pub fn detect_cycles(&self) -> Vec<Vec<TaskId>> {
        let mut cycles = Vec::new();
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut rec_stack: HashSet<TaskId> = HashSet::new();
        let mut path: Vec<TaskId> = Vec::new();

        for start in &self.tasks {
            if visited.contains(&start.id) {
                continue;
            }
            self.dfs_cycles(&start.id, &mut visited, &mut rec_stack, &mut path, &mut cycles);
        }

        cycles
    }

    fn dfs_cycles(
        &self,
        node: &TaskId,
        visited: &mut HashSet<TaskId>,
        rec_stack: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
        cycles: &mut Vec<Vec<TaskId>>,
    ) {
        if rec_stack.contains(node) {
            if let Some(start) = path.iter().position(|id| id == node) {
                let mut cycle: Vec<TaskId> = path[start..].to_vec();
                cycle.push(node.clone());
                cycles.push(cycle);
            }
            return;
        }
        if visited.contains(node) {
            return;
        }

        visited.insert(node.clone());
        rec_stack.insert(node.clone());
        path.push(node.clone());

        if let Some(deps) = self.blocked_by_edges.get(node) {
            for dep in deps {
                if self.task_by_id.contains_key(dep) {
                    self.dfs_cycles(dep, visited, rec_stack, path, cycles);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
    }

    /// `blocked_by` / `depends_on` references to ids not in the task set.
    /// Archived completed tasks are in the set, so they satisfy
    /// references rather than appearing here.
    pub fn missing_dependencies(&self) -> BTreeMap<TaskId, Vec<TaskId>> {
        let mut missing = BTreeMap::new();
        for task in &self.tasks {
            let mut absent: Vec<TaskId> = Vec::new();
            for dep in task.blocked_by.iter().chain(task.depends_on.iter()) {
                if !self.task_by_id.contains_key(dep) {
                    absent.push(dep.clone());
                }
            }
            if !absent.is_empty() {
                missing.insert(task.id.clone(), absent);
            }
        }
        missing
    }

    /// Non-completed tasks whose `blocked_by` is entirely completed,
    /// sorted lexicographically by id for byte-identical output.
    pub fn topological_ready_set(&self, completed_ids: &BTreeSet<TaskId>) -> Vec<Task> {
        let mut ready: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| !task.is_completed())
            .filter(|task| task.is_ready(completed_ids))
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.id.cmp(&b.id));
        ready
    }

    /// `(ok, errors)`: cycles, missing references, duplicate ids.
    pub fn validate(&self) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        for cycle in self.detect_cycles() {
            let rendered: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
            errors.push(format!(
                "Circular dependency detected: {}",
                rendered.join(" -> ")
            ));
        }

        for (task_id, missing) in self.missing_dependencies() {
            let rendered: Vec<&str> = missing.iter().map(TaskId::as_str).collect();
            errors.push(format!(
                "Task {task_id} references non-existent dependencies: {}",
                rendered.join(", ")
            ));
        }

        // Duplicate ids cannot survive the id map; count the raw list.
        let mut counts: BTreeMap<&TaskId, usize> = BTreeMap::new();
        for task in &self.tasks {
            *counts.entry(&task.id).or_default() += 1;
        }
        for (id, count) in counts {
            if count > 1 {
                errors.push(format!("Duplicate task ID: {id}"));
            }
        }

        (errors.is_empty(), errors)
    }

    /// Transitive closures per edge kind, memoized against diamonds.
    pub fn dependency_closure(&self, task_id: &TaskId) -> DependencyClosure {
        let mut closure = DependencyClosure::default();
        if !self.task_by_id.contains_key(task_id) {
            return closure;
        }

        let mut visited: HashSet<TaskId> = HashSet::new();
        self.traverse(task_id, &self.blocked_by_edges, &mut visited, &mut |id| {
            closure.blocking.insert(id.clone());
            closure.transitive.insert(id.clone());
        });

        let mut visited: HashSet<TaskId> = HashSet::new();
        self.traverse(task_id, &self.depends_on_edges, &mut visited, &mut |id| {
            closure.artifacts.insert(id.clone());
            closure.transitive.insert(id.clone());
        });

        closure
    }

    fn traverse(
        &self,
        node: &TaskId,
        edges: &HashMap<TaskId, Vec<TaskId>>,
        visited: &mut HashSet<TaskId>,
        record: &mut impl FnMut(&TaskId),
    ) {
        if !visited.insert(node.clone()) {
            return;
        }
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if self.task_by_id.contains_key(dep) {
                    record(dep);
                    self.traverse(dep, edges, visited, record);
                }
            }
        }
    }

    /// BFS over the reverse blocking index: everything downstream of
    /// `task_id`, in breadth-first order.
    pub fn find_transitively_blocked(&self, task_id: &TaskId) -> Vec<Task> {
        let mut blocked = Vec::new();
        let mut visited: HashSet<TaskId> = HashSet::new();
        visited.insert(task_id.clone());
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        queue.push_back(task_id.clone());

        while let Some(current) = queue.pop_front() {
            if let Some(downstream) = self.reverse_blocked_by.get(&current) {
                for next in downstream {
                    if visited.insert(next.clone()) {
                        queue.push_back(next.clone());
                        if let Some(task) = self.task_by_id.get(next) {
                            blocked.push(task.clone());
                        }
                    }
                }
            }
        }

        blocked
    }

    /// Left-to-right DOT export. Node fill tracks status, unblockers get
    /// double peripheries, blocking edges are solid, artifact edges
    /// dashed.
    pub fn export_dot(&self) -> String {
        let mut lines = vec![
            "digraph task_dependencies {".to_string(),
            "  rankdir=LR;".to_string(),
            "  node [shape=box, style=filled];".to_string(),
            String::new(),
        ];

        for task in &self.tasks {
            let color = match task.status.as_str() {
                "completed" => "lightgreen",
                "in_progress" => "lightyellow",
                "blocked" => "lightcoral",
                "draft" => "aliceblue",
                "todo" => "lightgray",
                _ => "white",
            };

            let mut label = format!("{}\\n{}", task.id, task.priority);
            if task.unblocker {
                label.push_str("\\n[UNBLOCKER]");
            }

            let mut attrs = vec![format!("label=\"{label}\""), format!("fillcolor=\"{color}\"")];
            if task.unblocker {
                attrs.push("peripheries=2".to_string());
            }
            lines.push(format!("  \"{}\" [{}];", task.id, attrs.join(", ")));
        }

        lines.push(String::new());
        lines.push("  // blocked_by edges (hard blockers)".to_string());
        for task in &self.tasks {
            for dep in &task.blocked_by {
                lines.push(format!(
                    "  \"{dep}\" -> \"{}\" [style=solid, color=black];",
                    task.id
                ));
            }
        }

        lines.push(String::new());
        lines.push("  // depends_on edges (informational)".to_string());
        for task in &self.tasks {
            for dep in &task.depends_on {
                lines.push(format!(
                    "  \"{dep}\" -> \"{}\" [style=dashed, color=gray];",
                    task.id
                ));
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mk_task(id: &str, status: &str, blocked_by: &[&str], depends_on: &[&str]) -> Task {
        Task {
            id: TaskId::from(id),
            title: format!("Task {id}"),
            status: status.to_string(),
            priority: "P1".to_string(),
            area: "backend".to_string(),
            path: PathBuf::from(format!("tasks/backend/{id}.task.yaml")),
            schema_version: "1.0".to_string(),
            unblocker: false,
            order: None,
            blocked_by: blocked_by.iter().map(|s| TaskId::from(*s)).collect(),
            depends_on: depends_on.iter().map(|s| TaskId::from(*s)).collect(),
            blocked_reason: None,
            mtime: 0,
            hash: String::new(),
        }
    }

    #[test]
    fn detects_three_node_cycle_with_all_ids() {
        let graph = DependencyGraph::new(vec![
            mk_task("TASK-A", "todo", &["TASK-B"], &[]),
            mk_task("TASK-B", "todo", &["TASK-C"], &[]),
            mk_task("TASK-C", "todo", &["TASK-A"], &[]),
        ]);

        let (ok, errors) = graph.validate();
        assert!(!ok);
        let cycle_errors: Vec<&String> = errors
            .iter()
            .filter(|e| e.contains("Circular dependency"))
            .collect();
        assert_eq!(cycle_errors.len(), 1);
        for id in ["TASK-A", "TASK-B", "TASK-C"] {
            assert!(cycle_errors[0].contains(id));
        }
    }

    #[test]
    fn acyclic_graph_validates() {
        let graph = DependencyGraph::new(vec![
            mk_task("TASK-A", "todo", &[], &[]),
            mk_task("TASK-B", "todo", &["TASK-A"], &[]),
        ]);
        let (ok, errors) = graph.validate();
        assert!(ok, "unexpected errors: {errors:?}");
    }

    #[test]
    fn missing_references_cover_both_edge_kinds() {
        let graph = DependencyGraph::new(vec![mk_task(
            "TASK-A",
            "todo",
            &["TASK-GONE"],
            &["TASK-ALSO-GONE"],
        )]);
        let missing = graph.missing_dependencies();
        let absent = missing.get(&TaskId::from("TASK-A")).unwrap();
        assert_eq!(absent.len(), 2);
    }

    #[test]
    fn ready_set_is_sorted_and_respects_blockers() {
        let graph = DependencyGraph::new(vec![
            mk_task("TASK-C", "todo", &["TASK-A"], &[]),
            mk_task("TASK-B", "todo", &[], &[]),
            mk_task("TASK-A", "completed", &[], &[]),
        ]);

        let mut completed = BTreeSet::new();
        completed.insert(TaskId::from("TASK-A"));

        let ready = graph.topological_ready_set(&completed);
        let ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["TASK-B", "TASK-C"]);
    }

    #[test]
    fn depends_on_never_gates_readiness() {
        let graph = DependencyGraph::new(vec![
            mk_task("TASK-A", "todo", &[], &["TASK-X"]),
            mk_task("TASK-X", "todo", &[], &[]),
        ]);
        let ready = graph.topological_ready_set(&BTreeSet::new());
        assert_eq!(ready.len(), 2);
    }

    #[test]
    fn closure_separates_edge_kinds_and_handles_diamonds() {
        let graph = DependencyGraph::new(vec![
            mk_task("TASK-A", "todo", &["TASK-B", "TASK-C"], &["TASK-E"]),
            mk_task("TASK-B", "todo", &["TASK-D"], &[]),
            mk_task("TASK-C", "todo", &["TASK-D"], &[]),
            mk_task("TASK-D", "todo", &[], &[]),
            mk_task("TASK-E", "completed", &[], &[]),
        ]);

        let closure = graph.dependency_closure(&TaskId::from("TASK-A"));
        let blocking: Vec<&str> = closure.blocking.iter().map(TaskId::as_str).collect();
        assert_eq!(blocking, vec!["TASK-B", "TASK-C", "TASK-D"]);
        let artifacts: Vec<&str> = closure.artifacts.iter().map(TaskId::as_str).collect();
        assert_eq!(artifacts, vec!["TASK-E"]);
        assert_eq!(closure.transitive.len(), 4);
    }

    #[test]
    fn reverse_traversal_finds_downstream_tasks() {
        let graph = DependencyGraph::new(vec![
            mk_task("TASK-A", "todo", &[], &[]),
            mk_task("TASK-B", "todo", &["TASK-A"], &[]),
            mk_task("TASK-C", "todo", &["TASK-B"], &[]),
        ]);
        let blocked = graph.find_transitively_blocked(&TaskId::from("TASK-A"));
        let ids: Vec<&str> = blocked.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["TASK-B", "TASK-C"]);
    }

    #[test]
    fn dot_export_styles_nodes_and_edges() {
        let mut unblocker = mk_task("TASK-U", "blocked", &[], &[]);
        unblocker.unblocker = true;
        let graph = DependencyGraph::new(vec![
            unblocker,
            mk_task("TASK-B", "todo", &["TASK-U"], &["TASK-U"]),
        ]);

        let dot = graph.export_dot();
        assert!(dot.starts_with("digraph task_dependencies {"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("peripheries=2"));
        assert!(dot.contains("fillcolor=\"lightcoral\""));
        assert!(dot.contains("[style=solid, color=black]"));
        assert!(dot.contains("[style=dashed, color=gray]"));
    }
}
