//! API-facing request/response models for the reporting and administration
//! layer.
//!
//! Everything here is read/control passthrough. Recommendations are derived
//! purely from the health summary, failed tasks and coordinator status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    AdmissionVerdict, CoordinationMode, CoordinationStatus, DisableReason, EngineError, ExecutionStatus,
    FailedTask, HealthSummary, HistoryFilter, RetryConfigUpdate, RetryPolicy, Spawn, TaskExecutionResult,
    TaskScheduler, TaskSnapshot,
};
use crate::util::serde::{Priority, TaskId};

/// Success rate under which a warning is raised.
pub const SUCCESS_RATE_WARNING: f64 = 0.8;

/// Task list/detail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Task identifier.
    pub task_id: TaskId,
    /// Display name.
    pub name: String,
    /// Collection category.
    pub task_type: String,
    /// Whether the task may be scheduled.
    pub enabled: bool,
    /// Scheduling priority.
    pub priority: Priority,
    /// Nominal interval.
    pub interval_seconds: u64,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Whether an execution is in flight.
    pub running: bool,
    /// Next due time.
    pub next_run_at: DateTime<Utc>,
    /// Start of the last execution.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Status of the last execution.
    pub last_status: Option<ExecutionStatus>,
    /// Why the task is disabled.
    pub disabled_reason: Option<DisableReason>,
}

impl From<TaskSnapshot> for TaskSummary {
    fn from(t: TaskSnapshot) -> Self {
        Self {
            priority: t.definition.priority_value(),
            task_id: t.definition.task_id,
            name: t.definition.name,
            task_type: t.definition.task_type,
            enabled: t.definition.enabled,
            interval_seconds: t.definition.interval.as_secs(),
            retry: t.definition.retry,
            consecutive_failures: t.runtime.consecutive_failures,
            running: t.runtime.running,
            next_run_at: t.runtime.next_run_at,
            last_run_at: t.runtime.last_run_at,
            last_status: t.runtime.last_status,
            disabled_reason: t.runtime.disabled_reason,
        }
    }
}

/// Execution history request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryQuery {
    /// Only this task.
    pub task_id: Option<TaskId>,
    /// Only this status.
    pub status: Option<ExecutionStatus>,
    /// Maximum results.
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            task_id: None,
            status: None,
            limit: 50,
        }
    }
}

/// Recommendation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth knowing.
    Info,
    /// Needs attention soon.
    Warning,
    /// Needs action now.
    Critical,
}

/// Operator-facing advice derived from health data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// How urgent.
    pub severity: Severity,
    /// Task the advice is about, if any.
    pub task_id: Option<TaskId>,
    /// Human-readable advice.
    pub message: String,
}

impl Recommendation {
    fn new(severity: Severity, task_id: Option<&str>, message: String) -> Self {
        Self {
            severity,
            task_id: task_id.map(str::to_string),
            message,
        }
    }
}

/// Full health payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Aggregate counts and success rate.
    pub summary: HealthSummary,
    /// Tasks with a failure streak.
    pub failed_tasks: Vec<FailedTask>,
    /// Coordinator status.
    pub coordination: CoordinationStatus,
    /// Advice, most severe first.
    pub recommendations: Vec<Recommendation>,
}

/// List tasks.
pub fn list_tasks<S: Spawn>(scheduler: &TaskScheduler<S>, include_disabled: bool) -> Vec<TaskSummary> {
    scheduler
        .list_tasks(include_disabled)
        .into_iter()
        .map(TaskSummary::from)
        .collect()
}

/// Task detail.
///
/// # Errors
///
/// `TaskNotFound`.
pub fn task_detail<S: Spawn>(scheduler: &TaskScheduler<S>, task_id: &str) -> Result<TaskSummary, EngineError> {
    scheduler.get_task(task_id).map(TaskSummary::from)
}

/// Execution history, newest first.
pub fn execution_history<S: Spawn>(scheduler: &TaskScheduler<S>, query: &HistoryQuery) -> Vec<TaskExecutionResult> {
    let filter = HistoryFilter {
        task_id: query.task_id.clone(),
        status: query.status,
    };
    scheduler.get_execution_history(&filter, query.limit)
}

/// Enable a task.
///
/// # Errors
///
/// `TaskNotFound`.
pub fn enable_task<S: Spawn>(scheduler: &TaskScheduler<S>, task_id: &str) -> Result<(), EngineError> {
    scheduler.enable_task(task_id)
}

/// Disable a task.
///
/// # Errors
///
/// `TaskNotFound`.
pub fn disable_task<S: Spawn>(scheduler: &TaskScheduler<S>, task_id: &str) -> Result<(), EngineError> {
    scheduler.disable_task(task_id)
}

/// Run a task now, subject to admission.
///
/// # Errors
///
/// `TaskNotFound` or `Shutdown`.
pub fn run_task_now<S: Spawn>(scheduler: &TaskScheduler<S>, task_id: &str) -> Result<AdmissionVerdict, EngineError> {
    scheduler.run_task_now(task_id)
}

/// Reset a task's failure streak.
///
/// # Errors
///
/// `TaskNotFound`.
pub fn reset_failures<S: Spawn>(scheduler: &TaskScheduler<S>, task_id: &str) -> Result<(), EngineError> {
    scheduler.reset_task_failures(task_id)
}

/// Update a task's retry policy.
///
/// # Errors
///
/// `TaskNotFound` or `InvalidRetryConfig`.
pub fn update_retry_config<S: Spawn>(
    scheduler: &TaskScheduler<S>,
    task_id: &str,
    update: RetryConfigUpdate,
) -> Result<RetryPolicy, EngineError> {
    scheduler.update_retry_config(task_id, update)
}

/// Coordinator status.
pub fn coordination_status<S: Spawn>(scheduler: &TaskScheduler<S>) -> CoordinationStatus {
    scheduler.coordination_status()
}

/// Health summary, failed tasks, coordinator status and recommendations.
pub fn health_report<S: Spawn>(scheduler: &TaskScheduler<S>) -> HealthReport {
    let summary = scheduler.get_task_health_summary();
    let failed_tasks = scheduler.get_failed_tasks();
    let coordination = scheduler.coordination_status();
    let recommendations = recommendations(&summary, &failed_tasks, &coordination);
    HealthReport {
        summary,
        failed_tasks,
        coordination,
        recommendations,
    }
}

/// Derive advice, most severe first.
pub fn recommendations(
    summary: &HealthSummary,
    failed: &[FailedTask],
    coordination: &CoordinationStatus,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    match coordination.mode {
        CoordinationMode::Emergency => out.push(Recommendation::new(
            Severity::Critical,
            None,
            "emergency mode: only critical tasks are running; investigate the failure spike or load".into(),
        )),
        CoordinationMode::HighLoad => out.push(Recommendation::new(
            Severity::Warning,
            None,
            "high load: task intervals are doubled until load subsides".into(),
        )),
        CoordinationMode::Normal => {}
    }

    for task in failed {
        if matches!(task.disabled_reason, Some(DisableReason::AutoDisabled { .. })) {
            out.push(Recommendation::new(
                Severity::Critical,
                Some(&task.task_id),
                format!(
                    "{} auto-disabled after {} consecutive failures; fix the cause and reset failures",
                    task.task_id, task.consecutive_failures
                ),
            ));
        } else if task.enabled && task.consecutive_failures.saturating_mul(2) >= task.auto_disable_threshold {
            out.push(Recommendation::new(
                Severity::Warning,
                Some(&task.task_id),
                format!(
                    "{} has failed {} of {} allowed times in a row",
                    task.task_id, task.consecutive_failures, task.auto_disable_threshold
                ),
            ));
        }
    }

    for (task_id, root) in &summary.starved_tasks {
        out.push(Recommendation::new(
            Severity::Warning,
            Some(task_id),
            format!("{task_id} cannot run while its dependency {root} is disabled"),
        ));
    }

    let total = summary.history.completed + summary.history.failed + summary.history.timed_out;
    if total > 0 && summary.success_rate < SUCCESS_RATE_WARNING {
        out.push(Recommendation::new(
            Severity::Warning,
            None,
            format!("success rate {:.0}% over recent executions", summary.success_rate * 100.0),
        ));
    }

    let counters = &coordination.counters;
    if counters.resource_conflicts_resolved > counters.admissions_granted && counters.admissions_granted > 0 {
        out.push(Recommendation::new(
            Severity::Info,
            None,
            "resource contention exceeds admissions; consider staggering task intervals".into(),
        ));
    }

    out.sort_by(|a, b| b.severity.cmp(&a.severity));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoordinationCounters, HistoryStats};
    use std::collections::BTreeMap;

    fn summary() -> HealthSummary {
        HealthSummary {
            total_tasks: 2,
            enabled_tasks: 1,
            disabled_tasks: 1,
            critical_tasks: 1,
            running_tasks: 0,
            success_rate: 1.0,
            history: HistoryStats::default(),
            mode: CoordinationMode::Normal,
            starved_tasks: BTreeMap::new(),
        }
    }

    fn status(mode: CoordinationMode) -> CoordinationStatus {
        CoordinationStatus {
            mode,
            counters: CoordinationCounters::default(),
            dependency_count: 0,
            active_lock_count: 0,
            running_tasks: Vec::new(),
            resource_usage: BTreeMap::new(),
            dependency_map: BTreeMap::new(),
        }
    }

    #[test]
    fn healthy_engine_has_no_advice() {
        assert!(recommendations(&summary(), &[], &status(CoordinationMode::Normal)).is_empty());
    }

    #[test]
    fn auto_disabled_task_is_critical_and_sorted_first() {
        let failed = vec![FailedTask {
            task_id: "t1".into(),
            name: "t1".into(),
            consecutive_failures: 3,
            max_retries: 2,
            auto_disable_threshold: 3,
            enabled: false,
            last_error: Some("boom".into()),
            disabled_reason: Some(DisableReason::AutoDisabled {
                consecutive_failures: 3,
                last_error: Some("boom".into()),
            }),
        }];
        let mut s = summary();
        s.starved_tasks.insert("t2".into(), "t1".into());
        let recs = recommendations(&s, &failed, &status(CoordinationMode::HighLoad));
        assert_eq!(recs[0].severity, Severity::Critical);
        assert_eq!(recs[0].task_id.as_deref(), Some("t1"));
        assert!(recs.iter().any(|r| r.task_id.as_deref() == Some("t2")));
        assert_eq!(recs.len(), 3);
    }
}
