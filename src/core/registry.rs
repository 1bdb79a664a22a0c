//! Task registry: catalog definitions plus mutable per-task runtime state.
//!
//! Definitions are registered once at startup and never removed. The
//! `enabled` flag and retry policy are mutable through administrative calls;
//! runtime state is mutated only by the scheduler's dispatch and completion
//! transitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::dependency::TaskDependency;
use super::error::EngineError;
use super::executor::WorkUnit;
use super::history::ExecutionStatus;
use crate::config::RetryBackoff;
use crate::util::serde::{Priority, ResourceKind, TaskId};

/// Retry and auto-disable policy of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failures that are retried after `retry_delay_seconds`.
    pub max_retries: u32,
    /// Base delay before a retry.
    pub retry_delay_seconds: u64,
    /// Consecutive failures that disable the task.
    pub auto_disable_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 60,
            auto_disable_threshold: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, backoff: RetryBackoff, cap: Duration) -> Duration {
        let base = Duration::from_secs(self.retry_delay_seconds);
        match backoff {
            RetryBackoff::Fixed => base,
            RetryBackoff::Exponential => {
                let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(cap).min(cap.max(base))
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.auto_disable_threshold == 0 {
            return Err("auto_disable_threshold must be at least 1".into());
        }
        Ok(())
    }
}

/// Partial update of a task's retry policy; absent fields stay unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfigUpdate {
    /// New `max_retries`.
    pub max_retries: Option<u32>,
    /// New `retry_delay_seconds`.
    pub retry_delay_seconds: Option<u64>,
    /// New `auto_disable_threshold`.
    pub auto_disable_threshold: Option<u32>,
}

/// Why a task is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DisableReason {
    /// Disabled through administration or the catalog.
    Manual,
    /// Disabled by policy after sustained failures.
    AutoDisabled {
        /// Failure streak at the time of disabling.
        consecutive_failures: u32,
        /// Error of the final failure.
        last_error: Option<String>,
    },
}

/// Catalog entry for a recurring task.
#[derive(Clone)]
pub struct TaskDefinition {
    /// Unique identifier.
    pub task_id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Collection category, passed to the security hook.
    pub task_type: String,
    /// The opaque operation this task performs.
    pub work: Arc<dyn WorkUnit>,
    /// Nominal period between runs.
    pub interval: Duration,
    /// Hard wall-clock limit per execution; `None` uses the engine default.
    pub timeout: Option<Duration>,
    /// Whether the task may be scheduled.
    pub enabled: bool,
    /// Retry and auto-disable policy.
    pub retry: RetryPolicy,
    /// Ordering, exclusion and resource profile.
    pub dependency: TaskDependency,
    /// Typical run time, credited to savings when the task is deferred.
    pub estimated_duration: Duration,
}

impl TaskDefinition {
    /// Definition with defaults: 60 s interval, enabled, priority 5.
    pub fn new(task_id: impl Into<TaskId>, work: Arc<dyn WorkUnit>) -> Self {
        let task_id = task_id.into();
        Self {
            name: task_id.clone(),
            task_type: task_id.clone(),
            task_id,
            work,
            interval: Duration::from_secs(60),
            timeout: None,
            enabled: true,
            retry: RetryPolicy::default(),
            dependency: TaskDependency::with_priority(5),
            estimated_duration: Duration::from_secs(1),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the task type.
    #[must_use]
    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Set the nominal interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the execution timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the initial enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set priority (lower runs first).
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.dependency.priority = priority;
        self
    }

    /// Add a dependency on another task.
    #[must_use]
    pub fn depends_on(mut self, task_id: impl Into<TaskId>) -> Self {
        self.dependency = self.dependency.depends_on(task_id);
        self
    }

    /// Add a conflict with another task.
    #[must_use]
    pub fn conflicts_with(mut self, task_id: impl Into<TaskId>) -> Self {
        self.dependency = self.dependency.conflicts_with(task_id);
        self
    }

    /// Require a resource category while running.
    #[must_use]
    pub fn requires(mut self, kind: ResourceKind) -> Self {
        self.dependency = self.dependency.requires(kind);
        self
    }

    /// Set the duration estimate.
    #[must_use]
    pub const fn estimated_duration(mut self, estimate: Duration) -> Self {
        self.estimated_duration = estimate;
        self
    }

    /// Scheduling priority.
    pub const fn priority_value(&self) -> Priority {
        self.dependency.priority
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("task_id", &self.task_id)
            .field("name", &self.name)
            .field("task_type", &self.task_type)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .field("retry", &self.retry)
            .field("dependency", &self.dependency)
            .finish_non_exhaustive()
    }
}

/// Mutable per-task state owned by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRuntimeState {
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Earliest time the task is due again.
    pub next_run_at: DateTime<Utc>,
    /// Start of the most recent execution.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Whether an execution is in flight.
    pub running: bool,
    /// Status of the most recent finished execution.
    pub last_status: Option<ExecutionStatus>,
    /// Error of the most recent failed execution.
    pub last_error: Option<String>,
    /// Why the task is disabled, if it is.
    pub disabled_reason: Option<DisableReason>,
    /// Finished executions in this process lifetime.
    pub total_runs: u64,
}

impl TaskRuntimeState {
    fn new(next_run_at: DateTime<Utc>, enabled: bool) -> Self {
        Self {
            consecutive_failures: 0,
            next_run_at,
            last_run_at: None,
            running: false,
            last_status: None,
            last_error: None,
            disabled_reason: (!enabled).then_some(DisableReason::Manual),
            total_runs: 0,
        }
    }
}

/// Point-in-time copy of a registered task.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Definition, including current `enabled` and retry policy.
    pub definition: TaskDefinition,
    /// Runtime state.
    pub runtime: TaskRuntimeState,
}

impl TaskSnapshot {
    fn sort_key(&self) -> (Priority, &str) {
        (self.definition.priority_value(), self.definition.task_id.as_str())
    }
}

/// Entry mutated in place by the scheduler.
pub(crate) struct TaskEntry {
    pub(crate) definition: TaskDefinition,
    pub(crate) runtime: TaskRuntimeState,
}

impl TaskEntry {
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            definition: self.definition.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

/// Catalog of tasks and their runtime state.
#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<BTreeMap<TaskId, TaskEntry>>,
}

impl TaskRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, first due at `first_run_at`.
    ///
    /// # Errors
    ///
    /// `DuplicateTask` if the id is taken; `InvalidRetryConfig` for a zero
    /// auto-disable threshold.
    pub fn register(&self, definition: TaskDefinition, first_run_at: DateTime<Utc>) -> Result<(), EngineError> {
        definition
            .retry
            .validate()
            .map_err(|reason| EngineError::InvalidRetryConfig {
                task_id: definition.task_id.clone(),
                reason,
            })?;
        let mut entries = self.entries.write();
        if entries.contains_key(&definition.task_id) {
            return Err(EngineError::DuplicateTask(definition.task_id));
        }
        let runtime = TaskRuntimeState::new(first_run_at, definition.enabled);
        entries.insert(definition.task_id.clone(), TaskEntry { definition, runtime });
        Ok(())
    }

    /// Snapshot of one task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn get(&self, task_id: &str) -> Result<TaskSnapshot, EngineError> {
        self.entries
            .read()
            .get(task_id)
            .map(TaskEntry::snapshot)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    /// Whether a task id is registered.
    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.read().contains_key(task_id)
    }

    /// Snapshots ordered by priority, then task id.
    pub fn list(&self, include_disabled: bool) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<TaskSnapshot> = self
            .entries
            .read()
            .values()
            .filter(|e| include_disabled || e.definition.enabled)
            .map(TaskEntry::snapshot)
            .collect();
        tasks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        tasks
    }

    /// Enabled, idle tasks whose `next_run_at` has passed, in priority order.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<TaskSnapshot> = self
            .entries
            .read()
            .values()
            .filter(|e| e.definition.enabled && !e.runtime.running && e.runtime.next_run_at <= now)
            .map(TaskEntry::snapshot)
            .collect();
        tasks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        tasks
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Enable a task. Scheduling cadence is left untouched.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn enable(&self, task_id: &str) -> Result<(), EngineError> {
        self.update(task_id, |def, rt| {
            def.enabled = true;
            rt.disabled_reason = None;
        })
    }

    /// Disable a task. In-flight executions are unaffected.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn disable(&self, task_id: &str) -> Result<(), EngineError> {
        self.update(task_id, |def, rt| {
            def.enabled = false;
            rt.disabled_reason = Some(DisableReason::Manual);
        })
    }

    /// Zero the failure streak and lift an auto-disable. Does not force a run.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn reset_failures(&self, task_id: &str) -> Result<(), EngineError> {
        self.update(task_id, |def, rt| {
            rt.consecutive_failures = 0;
            if matches!(rt.disabled_reason, Some(DisableReason::AutoDisabled { .. })) {
                rt.disabled_reason = None;
                def.enabled = true;
            }
        })
    }

    /// Apply a partial retry-policy update and return the resulting policy.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` or `InvalidRetryConfig`.
    pub fn update_retry_config(
        &self,
        task_id: &str,
        update: RetryConfigUpdate,
    ) -> Result<RetryPolicy, EngineError> {
        self.update(task_id, |def, _| {
            let mut policy = def.retry;
            if let Some(v) = update.max_retries {
                policy.max_retries = v;
            }
            if let Some(v) = update.retry_delay_seconds {
                policy.retry_delay_seconds = v;
            }
            if let Some(v) = update.auto_disable_threshold {
                policy.auto_disable_threshold = v;
            }
            policy
                .validate()
                .map_err(|reason| EngineError::InvalidRetryConfig {
                    task_id: task_id.to_string(),
                    reason,
                })?;
            def.retry = policy;
            Ok(policy)
        })?
    }

    /// Run `f` against one entry under the write lock.
    pub(crate) fn update<R>(
        &self,
        task_id: &str,
        f: impl FnOnce(&mut TaskDefinition, &mut TaskRuntimeState) -> R,
    ) -> Result<R, EngineError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        Ok(f(&mut entry.definition, &mut entry.runtime))
    }
}
