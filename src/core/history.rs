//! Execution results and the bounded execution-history log.
//!
//! The log is a fixed-capacity ring: appends overwrite the oldest slot once
//! full and reads walk backwards from the write cursor, so entries come out
//! newest first and are never reordered.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::serde::TaskId;

/// Lifecycle status of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Admitted but not started.
    Pending,
    /// Work unit in progress.
    Running,
    /// Work unit returned a payload.
    Completed,
    /// Work unit failed, panicked, or was blocked by security.
    Failed,
    /// Work unit exceeded its timeout.
    Timeout,
}

impl ExecutionStatus {
    /// Whether this status ends an attempt.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }
}

/// Why an attempt did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The work unit returned an error.
    WorkUnit,
    /// The work unit panicked.
    Panicked,
    /// The work unit did not return within its timeout.
    Timeout,
    /// The security hook denied the operation; not retried.
    SecurityBlocked,
}

/// Immutable record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    /// Unique id of this attempt.
    pub execution_id: Uuid,
    /// Task that ran.
    pub task_id: TaskId,
    /// When the attempt started.
    pub start_time: DateTime<Utc>,
    /// When the attempt finished.
    pub end_time: DateTime<Utc>,
    /// Measured wall-clock duration.
    pub duration: Duration,
    /// Final status.
    pub status: ExecutionStatus,
    /// Payload, present iff `status == Completed`.
    pub result_data: Option<Value>,
    /// Error text, present iff the attempt failed or timed out.
    pub error_message: Option<String>,
    /// Failure classification, present iff `error_message` is.
    pub failure_kind: Option<FailureKind>,
}

impl TaskExecutionResult {
    /// Build a completed result.
    pub fn completed(
        task_id: impl Into<TaskId>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration: Duration,
        data: Value,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            task_id: task_id.into(),
            start_time,
            end_time,
            duration,
            status: ExecutionStatus::Completed,
            result_data: Some(data),
            error_message: None,
            failure_kind: None,
        }
    }

    /// Build a failed or timed-out result. `FailureKind::Timeout` yields
    /// `ExecutionStatus::Timeout`; every other kind yields `Failed`.
    pub fn failed(
        task_id: impl Into<TaskId>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration: Duration,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        let status = if kind == FailureKind::Timeout {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Failed
        };
        Self {
            execution_id: Uuid::new_v4(),
            task_id: task_id.into(),
            start_time,
            end_time,
            duration,
            status,
            result_data: None,
            error_message: Some(message.into()),
            failure_kind: Some(kind),
        }
    }

    /// Whether this attempt counts against the task's failure policy.
    pub fn counts_as_failure(&self) -> bool {
        self.status != ExecutionStatus::Completed
            && self.failure_kind != Some(FailureKind::SecurityBlocked)
    }
}

/// Filter for history reads.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only results for this task.
    pub task_id: Option<TaskId>,
    /// Only results with this status.
    pub status: Option<ExecutionStatus>,
}

/// Aggregate counts over the retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Completed attempts.
    pub completed: usize,
    /// Failed attempts (including security-blocked).
    pub failed: usize,
    /// Timed-out attempts.
    pub timed_out: usize,
}

impl HistoryStats {
    /// `completed / (completed + failed + timed_out)`, or `1.0` when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.failed + self.timed_out;
        if total == 0 {
            1.0
        } else {
            self.completed as f64 / total as f64
        }
    }
}

struct Ring {
    slots: Vec<Option<TaskExecutionResult>>,
    cursor: usize,
    len: usize,
}

impl Ring {
    fn push(&mut self, item: TaskExecutionResult) {
        let cap = self.slots.len();
        self.slots[self.cursor] = Some(item);
        self.cursor = (self.cursor + 1) % cap;
        self.len = (self.len + 1).min(cap);
    }

    fn newest_first(&self) -> impl Iterator<Item = &TaskExecutionResult> {
        let cap = self.slots.len();
        (0..self.len).filter_map(move |i| self.slots[(self.cursor + cap - 1 - i) % cap].as_ref())
    }
}

/// Bounded execution-history log shared by the scheduler and reporting layer.
pub struct ExecutionHistory {
    ring: Mutex<Ring>,
}

impl ExecutionHistory {
    /// Create a log holding at most `capacity` results (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                cursor: 0,
                len: 0,
            }),
        }
    }

    /// Append a result, dropping the oldest once full.
    pub fn record(&self, result: TaskExecutionResult) {
        self.ring.lock().push(result);
    }

    /// Up to `limit` results matching `filter`, newest first.
    pub fn recent(&self, filter: &HistoryFilter, limit: usize) -> Vec<TaskExecutionResult> {
        let ring = self.ring.lock();
        ring.newest_first()
            .filter(|r| filter.task_id.as_ref().is_none_or(|id| &r.task_id == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Most recent result for a task.
    pub fn last_for(&self, task_id: &str) -> Option<TaskExecutionResult> {
        let ring = self.ring.lock();
        let found = ring.newest_first().find(|r| r.task_id == task_id).cloned();
        drop(ring);
        found
    }

    /// Counts by terminal status over everything retained.
    pub fn stats(&self) -> HistoryStats {
        let ring = self.ring.lock();
        let mut stats = HistoryStats::default();
        for r in ring.newest_first() {
            match r.status {
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Timeout => stats.timed_out += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => {}
            }
        }
        stats
    }

    /// Number of retained results.
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained results.
    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }
}
