//! Task coordinator: serialized admission over the dependency graph, the
//! resource ledger and the current coordination mode.
//!
//! Every admission decision runs under one coordination-wide lock, so two
//! tasks can never both observe a contested resource as free. A granted
//! admission returns an [`AdmissionPermit`]; dropping or completing the
//! permit releases everything the task acquired exactly once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dependency::{DependencyGraph, StartBlocker, TaskDependency};
use super::error::EngineError;
use super::history::ExecutionStatus;
use super::ledger::ResourceLedger;
use super::load::{CoordinationMode, LoadMonitor};
use super::registry::TaskRegistry;
use crate::config::CoordinatorConfig;
use crate::util::serde::{ResourceKind, TaskId};

/// Why a due task was not started this pass. Deferred tasks stay due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// An execution of the task is still in flight.
    AlreadyRunning,
    /// Emergency mode admits only critical-band tasks.
    EmergencyMode,
    /// A dependency has not completed or a conflicting task is running.
    DependencyOrConflict,
    /// An exclusive resource is held by another task.
    ResourceContention,
}

/// Why a task was refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The task is disabled.
    Disabled,
}

/// Serializable form of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum AdmissionVerdict {
    /// The task started.
    Granted,
    /// The task will be reconsidered on a later tick.
    Deferred(DeferReason),
    /// The task needs external action before it can run.
    Denied(DenyReason),
}

/// Result of [`TaskCoordinator::admit`].
#[derive(Debug)]
pub enum AdmissionDecision {
    /// Resources are held until the permit is completed or dropped.
    Granted(AdmissionPermit),
    /// Try again later; no penalty to failure counters.
    Deferred(DeferReason),
    /// Refused until re-enabled.
    Denied(DenyReason),
}

impl AdmissionDecision {
    /// Decision without the permit.
    pub const fn verdict(&self) -> AdmissionVerdict {
        match self {
            Self::Granted(_) => AdmissionVerdict::Granted,
            Self::Deferred(r) => AdmissionVerdict::Deferred(*r),
            Self::Denied(r) => AdmissionVerdict::Denied(*r),
        }
    }

    /// Whether the task was granted.
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Observability counters accumulated by admission.
///
/// Every deferral increments exactly one cause counter: a running conflict or
/// resource contention goes to `resource_conflicts_resolved`, an unsatisfied
/// dependency to `dependency_delays`, emergency mode to `emergency_deferrals`
/// and a task whose previous execution is still in flight to
/// `already_running_deferrals`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationCounters {
    /// Grants issued.
    pub admissions_granted: u64,
    /// Deferrals caused by a running conflicting task or resource contention.
    pub resource_conflicts_resolved: u64,
    /// Deferrals caused by an unsatisfied dependency.
    pub dependency_delays: u64,
    /// Deferrals caused by emergency mode.
    pub emergency_deferrals: u64,
    /// Deferrals of a task whose previous execution is still in flight.
    pub already_running_deferrals: u64,
    /// Denials of disabled tasks.
    pub denials: u64,
    /// Estimated run time avoided by deferring instead of contending.
    pub optimization_savings_seconds: f64,
}

/// Snapshot for the reporting layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationStatus {
    /// Current coordination mode.
    pub mode: CoordinationMode,
    /// Admission counters.
    pub counters: CoordinationCounters,
    /// Total `depends_on` edges in the graph.
    pub dependency_count: usize,
    /// Total (category, holder) pairs currently held.
    pub active_lock_count: usize,
    /// Tasks with an admitted execution in flight.
    pub running_tasks: Vec<TaskId>,
    /// Holder count per held category.
    pub resource_usage: BTreeMap<ResourceKind, usize>,
    /// Static coordination profile of every task.
    pub dependency_map: BTreeMap<TaskId, TaskDependency>,
}

#[derive(Debug)]
struct CoordinationState {
    ledger: ResourceLedger,
    running: HashSet<TaskId>,
    /// Generation of the outstanding grant per running task.
    grants: HashMap<TaskId, u64>,
    next_grant: u64,
    last_status: HashMap<TaskId, ExecutionStatus>,
    counters: CoordinationCounters,
}

impl CoordinationState {
    fn grant(&mut self, task_id: &str) -> u64 {
        let generation = self.next_grant;
        self.next_grant += 1;
        self.running.insert(task_id.to_string());
        self.grants.insert(task_id.to_string(), generation);
        generation
    }

    /// Release the grant `generation` of `task_id`. A stale generation is a
    /// no-op so it can never clear a later grant's holdings.
    fn release_grant(&mut self, task_id: &str, generation: u64, status: Option<ExecutionStatus>) -> bool {
        if self.grants.get(task_id) != Some(&generation) {
            return false;
        }
        self.grants.remove(task_id);
        self.running.remove(task_id);
        self.ledger.release(task_id);
        if let Some(status) = status {
            self.last_status.insert(task_id.to_string(), status);
        }
        true
    }
}

/// Proof of admission. Holds the task's resources and running mark.
#[derive(Debug)]
pub struct AdmissionPermit {
    task_id: TaskId,
    generation: u64,
    state: Arc<Mutex<CoordinationState>>,
    released: bool,
}

impl AdmissionPermit {
    /// Admitted task.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Grant generation, unique per coordinator.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Record how the execution ended and release its resources.
    pub fn complete(mut self, status: ExecutionStatus) {
        self.state
            .lock()
            .release_grant(&self.task_id, self.generation, Some(status));
        self.released = true;
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.released {
            self.state.lock().release_grant(&self.task_id, self.generation, None);
        }
    }
}

/// Admits or defers task executions.
pub struct TaskCoordinator {
    config: CoordinatorConfig,
    registry: Arc<TaskRegistry>,
    graph: DependencyGraph,
    monitor: Arc<LoadMonitor>,
    state: Arc<Mutex<CoordinationState>>,
}

impl TaskCoordinator {
    /// Create a coordinator over a validated graph.
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<TaskRegistry>,
        graph: DependencyGraph,
        monitor: Arc<LoadMonitor>,
    ) -> Self {
        let ledger = ResourceLedger::new(config.exclusive_resources.iter().copied());
        Self {
            config,
            registry,
            graph,
            monitor,
            state: Arc::new(Mutex::new(CoordinationState {
                ledger,
                running: HashSet::new(),
                grants: HashMap::new(),
                next_grant: 0,
                last_status: HashMap::new(),
                counters: CoordinationCounters::default(),
            })),
        }
    }

    /// Decide whether `task_id` may start now.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` for an unregistered id.
    pub fn admit(&self, task_id: &str) -> Result<AdmissionDecision, EngineError> {
        let task = self.registry.get(task_id)?;
        let mut state = self.state.lock();
        let mode = self.monitor.mode();

        if !task.definition.enabled {
            state.counters.denials += 1;
            debug!(task_id, "admission denied: disabled");
            return Ok(AdmissionDecision::Denied(DenyReason::Disabled));
        }

        if state.running.contains(task_id) {
            state.counters.already_running_deferrals += 1;
            debug!(task_id, "admission deferred: already running");
            return Ok(AdmissionDecision::Deferred(DeferReason::AlreadyRunning));
        }

        if mode == CoordinationMode::Emergency && !self.is_critical(task.definition.priority_value()) {
            state.counters.emergency_deferrals += 1;
            debug!(task_id, ?mode, "admission deferred: emergency mode");
            return Ok(AdmissionDecision::Deferred(DeferReason::EmergencyMode));
        }

        let estimate = task.definition.estimated_duration.as_secs_f64();
        let start = self
            .graph
            .check_start(task_id, &state.running, &state.last_status);
        if let Err(blocker) = start {
            match &blocker {
                StartBlocker::Conflict(_) => state.counters.resource_conflicts_resolved += 1,
                StartBlocker::Dependency(_) => state.counters.dependency_delays += 1,
            }
            state.counters.optimization_savings_seconds += estimate;
            debug!(task_id, ?blocker, "admission deferred: dependency or conflict");
            return Ok(AdmissionDecision::Deferred(DeferReason::DependencyOrConflict));
        }

        let resources: Vec<ResourceKind> = task
            .definition
            .dependency
            .required_resources
            .iter()
            .copied()
            .collect();
        if !state.ledger.try_acquire(task_id, &resources) {
            state.counters.resource_conflicts_resolved += 1;
            state.counters.optimization_savings_seconds += estimate;
            debug!(task_id, ?resources, "admission deferred: resource contention");
            return Ok(AdmissionDecision::Deferred(DeferReason::ResourceContention));
        }

        let generation = state.grant(task_id);
        state.counters.admissions_granted += 1;
        debug!(task_id, generation, ?mode, "admission granted");
        Ok(AdmissionDecision::Granted(AdmissionPermit {
            task_id: task_id.to_string(),
            generation,
            state: Arc::clone(&self.state),
            released: false,
        }))
    }

    /// Release ledger holdings of `task_id` that no outstanding grant owns.
    ///
    /// Idempotent; returns whether anything was released. While a permit for
    /// the task is alive this refuses and returns `false`: the permit is the
    /// only owner of a granted execution's resources and running mark.
    pub fn release_resources(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        if state.grants.contains_key(task_id) {
            debug!(task_id, "release refused: grant outstanding");
            return false;
        }
        state.ledger.release(task_id) > 0
    }

    /// Whether a priority falls in the critical band.
    pub const fn is_critical(&self, priority: u32) -> bool {
        priority <= self.config.critical_priority_max
    }

    /// Current mode's interval multiplier.
    pub fn interval_multiplier(&self) -> u32 {
        self.monitor.mode().interval_multiplier()
    }

    /// `interval` scaled by the current mode.
    pub fn effective_interval(&self, interval: Duration) -> Duration {
        interval.saturating_mul(self.interval_multiplier())
    }

    /// Current holder count per held category.
    pub fn resource_usage(&self) -> BTreeMap<ResourceKind, usize> {
        self.state.lock().ledger.usage()
    }

    /// Number of admitted executions in flight.
    pub fn running_count(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Whether `task_id` has an admitted execution in flight.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.state.lock().running.contains(task_id)
    }

    /// Last recorded status of `task_id` in this process lifetime.
    pub fn last_status(&self, task_id: &str) -> Option<ExecutionStatus> {
        self.state.lock().last_status.get(task_id).copied()
    }

    /// The validated dependency graph.
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The load monitor feeding the mode.
    pub const fn monitor(&self) -> &Arc<LoadMonitor> {
        &self.monitor
    }

    /// Mode, counters and graph summary for the reporting layer.
    pub fn get_coordination_status(&self) -> CoordinationStatus {
        let state = self.state.lock();
        let mut running_tasks: Vec<TaskId> = state.running.iter().cloned().collect();
        running_tasks.sort();
        CoordinationStatus {
            mode: self.monitor.mode(),
            counters: state.counters.clone(),
            dependency_count: self.graph.dependency_count(),
            active_lock_count: state.ledger.active_lock_count(),
            running_tasks,
            resource_usage: state.ledger.usage(),
            dependency_map: self.graph.entries().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadMonitorConfig;
    use crate::core::executor::FnWorkUnit;
    use crate::core::registry::TaskDefinition;
    use chrono::Utc;

    fn coordinator(defs: Vec<TaskDefinition>) -> TaskCoordinator {
        let registry = Arc::new(TaskRegistry::new());
        let now = Utc::now();
        let graph = DependencyGraph::new(
            defs.iter()
                .map(|d| (d.task_id.clone(), d.dependency.clone()))
                .collect::<Vec<_>>(),
        )
        .unwrap();
        for d in defs {
            registry.register(d, now).unwrap();
        }
        TaskCoordinator::new(
            CoordinatorConfig::default(),
            registry,
            graph,
            Arc::new(LoadMonitor::new(LoadMonitorConfig::default())),
        )
    }

    fn def(id: &str, priority: u32) -> TaskDefinition {
        let work = Arc::new(FnWorkUnit::new(|| async { Ok(serde_json::Value::Null) }));
        TaskDefinition::new(id, work).priority(priority)
    }

    #[test]
    fn exclusive_resource_contention_defers_second_task() {
        let c = coordinator(vec![
            def("t3", 1).requires(ResourceKind::SshConnection),
            def("t4", 2).requires(ResourceKind::SshConnection),
        ]);
        let permit = match c.admit("t3").unwrap() {
            AdmissionDecision::Granted(p) => p,
            other => panic!("expected grant, got {other:?}"),
        };
        assert_eq!(
            c.admit("t4").unwrap().verdict(),
            AdmissionVerdict::Deferred(DeferReason::ResourceContention)
        );
        permit.complete(ExecutionStatus::Completed);
        assert!(c.admit("t4").unwrap().is_granted());
    }

    #[test]
    fn running_task_is_not_readmitted() {
        let c = coordinator(vec![def("a", 1)]);
        let _permit = c.admit("a").unwrap();
        assert_eq!(
            c.admit("a").unwrap().verdict(),
            AdmissionVerdict::Deferred(DeferReason::AlreadyRunning)
        );
        assert_eq!(c.get_coordination_status().counters.already_running_deferrals, 1);
    }

    #[test]
    fn external_release_cannot_free_a_live_grant() {
        let c = coordinator(vec![
            def("t3", 1).requires(ResourceKind::SshConnection),
            def("t4", 2).requires(ResourceKind::SshConnection),
        ]);
        let AdmissionDecision::Granted(first) = c.admit("t3").unwrap() else {
            panic!("t3 should be granted");
        };

        assert!(!c.release_resources("t3"));
        assert!(c.is_running("t3"));
        assert_eq!(c.resource_usage().get(&ResourceKind::SshConnection), Some(&1));
        assert_eq!(
            c.admit("t3").unwrap().verdict(),
            AdmissionVerdict::Deferred(DeferReason::AlreadyRunning)
        );
        assert_eq!(
            c.admit("t4").unwrap().verdict(),
            AdmissionVerdict::Deferred(DeferReason::ResourceContention)
        );

        first.complete(ExecutionStatus::Completed);
        assert!(!c.is_running("t3"));
        assert!(c.admit("t4").unwrap().is_granted());
    }

    #[test]
    fn stale_generation_leaves_newer_grant_intact() {
        let c = coordinator(vec![def("t3", 1).requires(ResourceKind::SshConnection)]);
        let AdmissionDecision::Granted(first) = c.admit("t3").unwrap() else {
            panic!("t3 should be granted");
        };
        let stale = first.generation();
        first.complete(ExecutionStatus::Completed);

        let AdmissionDecision::Granted(second) = c.admit("t3").unwrap() else {
            panic!("t3 should be granted again");
        };
        assert_ne!(second.generation(), stale);
        assert!(!c.state.lock().release_grant("t3", stale, Some(ExecutionStatus::Failed)));
        assert!(c.is_running("t3"));
        assert_eq!(c.resource_usage().get(&ResourceKind::SshConnection), Some(&1));
        assert_eq!(c.last_status("t3"), Some(ExecutionStatus::Completed));

        drop(second);
        assert!(c.resource_usage().is_empty());
    }

    #[test]
    fn dropped_permit_releases_without_recording_status() {
        let c = coordinator(vec![def("a", 1).requires(ResourceKind::Database)]);
        {
            let decision = c.admit("a").unwrap();
            assert!(decision.is_granted());
        }
        assert_eq!(c.running_count(), 0);
        assert!(c.resource_usage().is_empty());
        assert_eq!(c.last_status("a"), None);
        assert!(!c.release_resources("a"));
    }

    #[test]
    fn emergency_mode_admits_only_critical_band() {
        let c = coordinator(vec![def("critical", 0), def("routine", 5)]);
        c.monitor().force_mode(CoordinationMode::Emergency);
        assert_eq!(
            c.admit("routine").unwrap().verdict(),
            AdmissionVerdict::Deferred(DeferReason::EmergencyMode)
        );
        assert!(c.admit("critical").unwrap().is_granted());
        assert_eq!(c.get_coordination_status().counters.emergency_deferrals, 1);
    }

    #[test]
    fn disabled_task_is_denied() {
        let c = coordinator(vec![def("a", 1).enabled(false)]);
        assert_eq!(
            c.admit("a").unwrap().verdict(),
            AdmissionVerdict::Denied(DenyReason::Disabled)
        );
    }

    #[test]
    fn unknown_task_is_an_error() {
        let c = coordinator(vec![]);
        assert!(matches!(c.admit("ghost"), Err(EngineError::TaskNotFound(_))));
    }

    #[test]
    fn deferrals_count_by_cause_and_accrue_savings() {
        let c = coordinator(vec![
            def("t1", 1).estimated_duration(Duration::from_secs(3)),
            def("t2", 2)
                .depends_on("t1")
                .estimated_duration(Duration::from_secs(3)),
        ]);
        assert!(!c.admit("t2").unwrap().is_granted());
        let status = c.get_coordination_status();
        assert_eq!(status.counters.dependency_delays, 1);
        assert!((status.counters.optimization_savings_seconds - 3.0).abs() < f64::EPSILON);
        assert_eq!(status.dependency_count, 1);
    }
}
