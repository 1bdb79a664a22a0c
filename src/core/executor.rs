//! Work-unit traits and the interfaces of the engine's external collaborators.
//!
//! The engine never performs remote collection itself. A task's work is an
//! opaque [`WorkUnit`]; collection, security approval and result fan-out are
//! injected through [`CollectionLayer`], [`SecurityHook`] and [`ResultSink`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::history::TaskExecutionResult;

/// Failure reported by a work unit.
#[derive(Debug, Clone, Error)]
pub enum WorkError {
    /// The work unit ran and reported a failure.
    #[error("{0}")]
    Failed(String),
    /// The collection layer returned a typed failure.
    #[error("collection failed: {0}")]
    Collection(#[from] CollectionError),
}

/// Typed failures from the remote collection layer.
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    /// The remote session could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// A diagnostic command ran but failed.
    #[error("command failed: {0}")]
    CommandFailed(String),
    /// The task type is not known to the collection layer.
    #[error("unsupported task type: {0}")]
    Unsupported(String),
}

/// An opaque unit of work executed by the scheduler.
///
/// Implementations own no retry or scheduling logic. They may block for as
/// long as they like; the scheduler enforces the task timeout from outside and
/// converts panics into failed results.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use fleet_orchestrator::core::{WorkError, WorkUnit};
///
/// struct Uptime;
///
/// #[async_trait]
/// impl WorkUnit for Uptime {
///     async fn run(&self) -> Result<serde_json::Value, WorkError> {
///         Ok(serde_json::json!({ "uptime_secs": 1234 }))
///     }
/// }
/// ```
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    /// Perform the work and return its payload.
    async fn run(&self) -> Result<Value, WorkError>;
}

/// Remote command/data-collection layer.
#[async_trait]
pub trait CollectionLayer: Send + Sync + 'static {
    /// Run the read-only diagnostics for `task_type` with `params`.
    async fn execute(&self, task_type: &str, params: &Value) -> Result<Value, CollectionError>;
}

/// Outcome of a security pre-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityVerdict {
    /// The operation may proceed.
    Allowed,
    /// The operation is blocked, with a reason.
    Denied(String),
}

/// Security validation consulted before a work unit is invoked.
#[async_trait]
pub trait SecurityHook: Send + Sync + 'static {
    /// Approve or deny the underlying remote operation of a task.
    async fn authorize(&self, task_id: &str, task_type: &str) -> SecurityVerdict;
}

/// Real-time fan-out layer that delivers finished results to subscribers.
pub trait ResultSink: Send + Sync + 'static {
    /// Hand a finished execution result to interested subscribers.
    fn publish(&self, result: &TaskExecutionResult);
}

/// Abstraction for spawning engine futures on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Work unit built from an async closure.
pub struct FnWorkUnit<F> {
    f: F,
}

impl<F, Fut> FnWorkUnit<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WorkError>> + Send + 'static,
{
    /// Wrap an async closure.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> WorkUnit for FnWorkUnit<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WorkError>> + Send + 'static,
{
    async fn run(&self) -> Result<Value, WorkError> {
        (self.f)().await
    }
}

/// Work unit built from a blocking closure; runs on tokio's blocking pool.
pub struct BlockingWorkUnit<F> {
    f: Arc<F>,
}

impl<F> BlockingWorkUnit<F>
where
    F: Fn() -> Result<Value, WorkError> + Send + Sync + 'static,
{
    /// Wrap a blocking closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> WorkUnit for BlockingWorkUnit<F>
where
    F: Fn() -> Result<Value, WorkError> + Send + Sync + 'static,
{
    async fn run(&self) -> Result<Value, WorkError> {
        let f = Arc::clone(&self.f);
        match tokio::task::spawn_blocking(move || f()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(WorkError::Failed(format!("blocking work cancelled: {e}"))),
        }
    }
}

/// Work unit that delegates to the collection layer.
pub struct CollectorWorkUnit {
    collector: Arc<dyn CollectionLayer>,
    task_type: String,
    params: Value,
}

impl CollectorWorkUnit {
    /// Create a unit that runs `task_type` with `params` on `collector`.
    pub fn new(collector: Arc<dyn CollectionLayer>, task_type: impl Into<String>, params: Value) -> Self {
        Self {
            collector,
            task_type: task_type.into(),
            params,
        }
    }
}

#[async_trait]
impl WorkUnit for CollectorWorkUnit {
    async fn run(&self) -> Result<Value, WorkError> {
        Ok(self.collector.execute(&self.task_type, &self.params).await?)
    }
}
