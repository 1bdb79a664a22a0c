//! Static dependency graph: ordering, mutual exclusion and resource needs.
//!
//! A dependency is satisfied once the last execution of the depended-on task
//! in this process lifetime completed. Never-run or failing dependencies
//! block their dependents indefinitely; [`DependencyGraph::starved`] reports
//! dependents stuck behind a disabled task so health reporting can surface it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::history::ExecutionStatus;
use crate::util::serde::{Priority, ResourceKind, TaskId};

/// Static coordination profile of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    /// Tasks whose last execution must have completed first.
    pub depends_on: BTreeSet<TaskId>,
    /// Tasks that must never run at the same time as this one.
    pub conflicts_with: BTreeSet<TaskId>,
    /// Resource categories held for the duration of an execution.
    pub required_resources: BTreeSet<ResourceKind>,
    /// Lower runs first on contention.
    pub priority: Priority,
}

impl TaskDependency {
    /// Profile with the given priority and no constraints.
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Add a `depends_on` edge.
    #[must_use]
    pub fn depends_on(mut self, task_id: impl Into<TaskId>) -> Self {
        self.depends_on.insert(task_id.into());
        self
    }

    /// Add a mutual-exclusion edge.
    #[must_use]
    pub fn conflicts_with(mut self, task_id: impl Into<TaskId>) -> Self {
        self.conflicts_with.insert(task_id.into());
        self
    }

    /// Require a resource category.
    #[must_use]
    pub fn requires(mut self, kind: ResourceKind) -> Self {
        self.required_resources.insert(kind);
        self
    }
}

/// Why a task may not start right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBlocker {
    /// A conflicting task is running.
    Conflict(TaskId),
    /// A dependency has not last completed.
    Dependency(TaskId),
}

/// Validated, immutable dependency graph for the whole catalog.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    entries: BTreeMap<TaskId, TaskDependency>,
}

impl DependencyGraph {
    /// Build and validate the graph.
    ///
    /// Conflicts are made symmetric. References to tasks outside the catalog
    /// and cycles in `depends_on` are configuration errors.
    ///
    /// # Errors
    ///
    /// `UnknownDependency` or `CyclicDependency`.
    pub fn new(
        entries: impl IntoIterator<Item = (TaskId, TaskDependency)>,
    ) -> Result<Self, EngineError> {
        let mut entries: BTreeMap<TaskId, TaskDependency> = entries.into_iter().collect();

        let mut reverse = Vec::new();
        for (id, dep) in &entries {
            for other in dep.depends_on.iter().chain(&dep.conflicts_with) {
                if !entries.contains_key(other) {
                    return Err(EngineError::UnknownDependency {
                        task_id: id.clone(),
                        dependency: other.clone(),
                    });
                }
            }
            for other in &dep.conflicts_with {
                reverse.push((other.clone(), id.clone()));
            }
        }
        for (id, other) in reverse {
            if let Some(dep) = entries.get_mut(&id) {
                dep.conflicts_with.insert(other);
            }
        }
        for (id, dep) in &mut entries {
            dep.conflicts_with.remove(id);
        }

        let graph = Self { entries };
        if let Some(cycle) = graph.find_cycle() {
            return Err(EngineError::CyclicDependency { cycle });
        }
        Ok(graph)
    }

    /// Profile of a task.
    pub fn get(&self, task_id: &str) -> Option<&TaskDependency> {
        self.entries.get(task_id)
    }

    /// All profiles, ordered by task id.
    pub fn entries(&self) -> &BTreeMap<TaskId, TaskDependency> {
        &self.entries
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total `depends_on` edges.
    pub fn dependency_count(&self) -> usize {
        self.entries.values().map(|d| d.depends_on.len()).sum()
    }

    /// Whether `task_id` may start given what is running and how each task
    /// last finished.
    pub fn may_start(
        &self,
        task_id: &str,
        running: &HashSet<TaskId>,
        last_status: &HashMap<TaskId, ExecutionStatus>,
    ) -> bool {
        self.check_start(task_id, running, last_status).is_ok()
    }

    /// Like [`Self::may_start`], naming the first blocker found.
    ///
    /// # Errors
    ///
    /// The conflicting or unsatisfied task.
    pub fn check_start(
        &self,
        task_id: &str,
        running: &HashSet<TaskId>,
        last_status: &HashMap<TaskId, ExecutionStatus>,
    ) -> Result<(), StartBlocker> {
        let Some(dep) = self.entries.get(task_id) else {
            return Ok(());
        };
        if let Some(c) = dep.conflicts_with.iter().find(|c| running.contains(*c)) {
            return Err(StartBlocker::Conflict(c.clone()));
        }
        if let Some(d) = dep
            .depends_on
            .iter()
            .find(|d| last_status.get(*d) != Some(&ExecutionStatus::Completed))
        {
            return Err(StartBlocker::Dependency(d.clone()));
        }
        Ok(())
    }

    /// Dependents that can never start because a direct or transitive
    /// dependency is in `disabled`. Each entry names the disabled root.
    pub fn starved(&self, disabled: &HashSet<TaskId>) -> BTreeMap<TaskId, TaskId> {
        let mut starved: BTreeMap<TaskId, TaskId> = BTreeMap::new();
        loop {
            let mut changed = false;
            for (id, dep) in &self.entries {
                if starved.contains_key(id) {
                    continue;
                }
                let root = dep.depends_on.iter().find_map(|d| {
                    if disabled.contains(d) {
                        Some(d.clone())
                    } else {
                        starved.get(d).cloned()
                    }
                });
                if let Some(root) = root {
                    starved.insert(id.clone(), root);
                    changed = true;
                }
            }
            if !changed {
                return starved;
            }
        }
    }

    fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        self.entries
            .keys()
            .find_map(|id| self.visit(id, &mut done, &mut path))
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        done: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<TaskId>> {
        if done.contains(id) {
            return None;
        }
        if let Some(start) = path.iter().position(|p| *p == id) {
            let mut cycle: Vec<TaskId> = path[start..].iter().map(|p| (*p).to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        path.push(id);
        if let Some(dep) = self.entries.get(id) {
            for next in &dep.depends_on {
                if let Some(cycle) = self.visit(next, done, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        done.insert(id);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entries: Vec<(&str, TaskDependency)>) -> Result<DependencyGraph, EngineError> {
        DependencyGraph::new(entries.into_iter().map(|(id, d)| (id.to_string(), d)))
    }

    #[test]
    fn dependency_blocks_until_completed() {
        let g = graph(vec![
            ("t1", TaskDependency::with_priority(0)),
            ("t2", TaskDependency::with_priority(1).depends_on("t1")),
        ])
        .unwrap();
        let running = HashSet::new();
        let mut last = HashMap::new();
        assert_eq!(
            g.check_start("t2", &running, &last),
            Err(StartBlocker::Dependency("t1".into()))
        );
        last.insert("t1".to_string(), ExecutionStatus::Failed);
        assert!(!g.may_start("t2", &running, &last));
        last.insert("t1".to_string(), ExecutionStatus::Completed);
        assert!(g.may_start("t2", &running, &last));
    }

    #[test]
    fn conflicts_are_symmetric() {
        let g = graph(vec![
            ("a", TaskDependency::with_priority(0).conflicts_with("b")),
            ("b", TaskDependency::with_priority(0)),
        ])
        .unwrap();
        let running: HashSet<TaskId> = ["a".to_string()].into();
        assert_eq!(
            g.check_start("b", &running, &HashMap::new()),
            Err(StartBlocker::Conflict("a".into()))
        );
    }

    #[test]
    fn cycle_is_named() {
        let err = graph(vec![
            ("a", TaskDependency::with_priority(0).depends_on("b")),
            ("b", TaskDependency::with_priority(0).depends_on("c")),
            ("c", TaskDependency::with_priority(0).depends_on("a")),
        ])
        .unwrap_err();
        match err {
            EngineError::CyclicDependency { cycle } => assert_eq!(cycle, ["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = graph(vec![("a", TaskDependency::with_priority(0).depends_on("a"))]).unwrap_err();
        assert!(err.to_string().contains("a -> a"));
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let err = graph(vec![("a", TaskDependency::with_priority(0).depends_on("ghost"))]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownDependency { .. }));
    }

    #[test]
    fn starvation_follows_transitive_dependents() {
        let g = graph(vec![
            ("root", TaskDependency::with_priority(0)),
            ("mid", TaskDependency::with_priority(1).depends_on("root")),
            ("leaf", TaskDependency::with_priority(2).depends_on("mid")),
            ("free", TaskDependency::with_priority(2)),
        ])
        .unwrap();
        let disabled: HashSet<TaskId> = ["root".to_string()].into();
        let starved = g.starved(&disabled);
        assert_eq!(starved.get("mid").map(String::as_str), Some("root"));
        assert_eq!(starved.get("leaf").map(String::as_str), Some("root"));
        assert!(!starved.contains_key("free"));
    }
}
