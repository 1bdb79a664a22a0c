//! Derived read-only views: tick reports, health summary and failed tasks.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::TaskScheduler;
use crate::core::coordinator::{DeferReason, DenyReason};
use crate::core::executor::Spawn;
use crate::core::history::HistoryStats;
use crate::core::load::CoordinationMode;
use crate::core::registry::DisableReason;
use crate::util::serde::TaskId;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Due tasks considered.
    pub evaluated: usize,
    /// Tasks dispatched.
    pub started: Vec<TaskId>,
    /// Tasks left due, with the reason.
    pub deferred: Vec<(TaskId, DeferReason)>,
    /// Tasks refused.
    pub denied: Vec<(TaskId, DenyReason)>,
}

impl TickReport {
    /// Whether no task was due.
    pub fn is_empty(&self) -> bool {
        self.evaluated == 0
    }

    /// Deferral reason for a task, if it was deferred.
    pub fn deferral_of(&self, task_id: &str) -> Option<DeferReason> {
        self.deferred
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, reason)| *reason)
    }
}

/// Aggregate health over the registry and retained history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Registered tasks.
    pub total_tasks: usize,
    /// Enabled tasks.
    pub enabled_tasks: usize,
    /// Disabled tasks.
    pub disabled_tasks: usize,
    /// Tasks whose failure streak reached their auto-disable threshold.
    pub critical_tasks: usize,
    /// Executions in flight.
    pub running_tasks: usize,
    /// `completed / (completed + failed + timed_out)`; 1.0 with no history.
    pub success_rate: f64,
    /// Outcome counts behind `success_rate`.
    pub history: HistoryStats,
    /// Current coordination mode.
    pub mode: CoordinationMode,
    /// Dependents that cannot start because a dependency is disabled,
    /// mapped to the disabled task.
    pub starved_tasks: BTreeMap<TaskId, TaskId>,
}

/// A task with a non-zero failure streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    /// Task id.
    pub task_id: TaskId,
    /// Display name.
    pub name: String,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Retries before falling back to the normal interval.
    pub max_retries: u32,
    /// Streak that disables the task.
    pub auto_disable_threshold: u32,
    /// Whether the task is still enabled.
    pub enabled: bool,
    /// Most recent error.
    pub last_error: Option<String>,
    /// Why the task is disabled.
    pub disabled_reason: Option<DisableReason>,
}

impl<S: Spawn> TaskScheduler<S> {
    /// Counts, success rate, mode and starvation. Never fails.
    pub fn get_task_health_summary(&self) -> HealthSummary {
        let tasks = self.inner.registry.list(true);
        let enabled_tasks = tasks.iter().filter(|t| t.definition.enabled).count();
        let critical_tasks = tasks
            .iter()
            .filter(|t| t.runtime.consecutive_failures >= t.definition.retry.auto_disable_threshold)
            .count();
        let disabled: HashSet<TaskId> = tasks
            .iter()
            .filter(|t| !t.definition.enabled)
            .map(|t| t.definition.task_id.clone())
            .collect();
        let history = self.inner.history.stats();

        HealthSummary {
            total_tasks: tasks.len(),
            enabled_tasks,
            disabled_tasks: tasks.len() - enabled_tasks,
            critical_tasks,
            running_tasks: self.inner.coordinator.running_count(),
            success_rate: history.success_rate(),
            history,
            mode: self.monitor().mode(),
            starved_tasks: self.inner.coordinator.graph().starved(&disabled),
        }
    }

    /// Tasks with `consecutive_failures > 0`, in priority order.
    pub fn get_failed_tasks(&self) -> Vec<FailedTask> {
        self.inner
            .registry
            .list(true)
            .into_iter()
            .filter(|t| t.runtime.consecutive_failures > 0)
            .map(|t| FailedTask {
                task_id: t.definition.task_id,
                name: t.definition.name,
                consecutive_failures: t.runtime.consecutive_failures,
                max_retries: t.definition.retry.max_retries,
                auto_disable_threshold: t.definition.retry.auto_disable_threshold,
                enabled: t.definition.enabled,
                last_error: t.runtime.last_error,
                disabled_reason: t.runtime.disabled_reason,
            })
            .collect()
    }
}
