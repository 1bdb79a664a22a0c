//! Error types for engine operations.

use thiserror::Error;

use crate::util::serde::TaskId;

/// Errors produced by engine components.
///
/// Configuration variants are fatal at startup. The remaining variants are
/// returned by administrative calls. Work-unit failures never surface here;
/// they are recorded as execution results instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A task with the same identifier is already registered.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),
    /// No task with this identifier exists.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The `depends_on` relation contains a cycle.
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Task ids along the cycle; the first id is repeated at the end.
        cycle: Vec<TaskId>,
    },
    /// A task depends on or conflicts with a task that is not in the catalog.
    #[error("task {task_id} references unknown task {dependency}")]
    UnknownDependency {
        /// The declaring task.
        task_id: TaskId,
        /// The missing task.
        dependency: TaskId,
    },
    /// Engine configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A retry policy update was rejected.
    #[error("invalid retry config for {task_id}: {reason}")]
    InvalidRetryConfig {
        /// Target task.
        task_id: TaskId,
        /// Validation failure.
        reason: String,
    },
    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    Shutdown,
}

impl EngineError {
    /// Whether this error belongs to the fatal startup group.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTask(_)
                | Self::CyclicDependency { .. }
                | Self::UnknownDependency { .. }
                | Self::InvalidConfig(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
