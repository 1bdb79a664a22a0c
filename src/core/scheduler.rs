//! Task scheduler: due-time evaluation, admission, dispatch and the
//! retry/auto-disable policy.
//!
//! A single timer loop calls [`TaskScheduler::tick`]. Each tick evaluates the
//! due tasks in `(priority, task_id)` order and asks the coordinator to admit
//! them; granted tasks are dispatched onto the spawner and run concurrently.
//! Nothing a work unit does (error, panic, hang) escapes the dispatch
//! boundary or stops the loop.
//!
//! ```rust,ignore
//! let scheduler = EngineBuilder::new()
//!     .with_tasks(fleet_catalog(collector))
//!     .build()?;
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown().await;
//! ```

mod dispatch;
mod reports;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::coordinator::{AdmissionDecision, AdmissionVerdict, CoordinationStatus, TaskCoordinator};
use super::error::EngineError;
use super::executor::{ResultSink, SecurityHook, Spawn};
use super::history::{ExecutionHistory, HistoryFilter, TaskExecutionResult};
use super::load::{LoadMonitor, SystemLoadSnapshot};
use super::registry::{RetryConfigUpdate, RetryPolicy, TaskDefinition, TaskRegistry, TaskSnapshot};
use crate::config::SchedulerConfig;
use crate::runtime::TokioSpawner;
use crate::util::clock::Clock;

pub use reports::{FailedTask, HealthSummary, TickReport};

/// Shared state reachable from dispatched executions.
pub(crate) struct SchedulerInner {
    pub(crate) config: SchedulerConfig,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) coordinator: Arc<TaskCoordinator>,
    pub(crate) history: ExecutionHistory,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) security: Option<Arc<dyn SecurityHook>>,
    pub(crate) sink: Option<Arc<dyn ResultSink>>,
    in_flight: AtomicUsize,
    idle: Notify,
    shut_down: AtomicBool,
}

/// Recurring-task scheduler.
pub struct TaskScheduler<S: Spawn = TokioSpawner> {
    inner: Arc<SchedulerInner>,
    spawner: S,
}

impl<S: Spawn + Clone> Clone for TaskScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            spawner: self.spawner.clone(),
        }
    }
}

/// Parts assembled by the engine builder.
pub(crate) struct SchedulerParts {
    pub(crate) config: SchedulerConfig,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) coordinator: Arc<TaskCoordinator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) security: Option<Arc<dyn SecurityHook>>,
    pub(crate) sink: Option<Arc<dyn ResultSink>>,
}

impl<S: Spawn> TaskScheduler<S> {
    pub(crate) fn from_parts(parts: SchedulerParts, spawner: S) -> Self {
        let history = ExecutionHistory::new(parts.config.history_capacity);
        Self {
            inner: Arc::new(SchedulerInner {
                config: parts.config,
                registry: parts.registry,
                coordinator: parts.coordinator,
                history,
                clock: parts.clock,
                security: parts.security,
                sink: parts.sink,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                shut_down: AtomicBool::new(false),
            }),
            spawner,
        }
    }

    /// Evaluate every due task once.
    ///
    /// # Errors
    ///
    /// `Shutdown` after [`SchedulerHandle::shutdown`]. Coordinator errors
    /// indicate a broken invariant and are returned as-is.
    pub fn tick(&self) -> Result<TickReport, EngineError> {
        self.ensure_running()?;
        let now = self.inner.clock.now();
        let due = self.inner.registry.due(now);
        let mut report = TickReport {
            evaluated: due.len(),
            ..TickReport::default()
        };

        for task in due {
            let task_id = task.definition.task_id.clone();
            match self.inner.coordinator.admit(&task_id)? {
                AdmissionDecision::Granted(permit) => {
                    self.dispatch(task.definition, permit, now)?;
                    report.started.push(task_id);
                }
                AdmissionDecision::Deferred(reason) => report.deferred.push((task_id, reason)),
                AdmissionDecision::Denied(reason) => report.denied.push((task_id, reason)),
            }
        }
        if !report.is_empty() {
            debug!(
                started = report.started.len(),
                deferred = report.deferred.len(),
                denied = report.denied.len(),
                "tick evaluated"
            );
        }
        Ok(report)
    }

    /// Trigger a task outside its cadence. Admission rules still apply.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` or `Shutdown`.
    pub fn run_task_now(&self, task_id: &str) -> Result<AdmissionVerdict, EngineError> {
        self.ensure_running()?;
        let task = self.inner.registry.get(task_id)?;
        let decision = self.inner.coordinator.admit(task_id)?;
        let verdict = decision.verdict();
        if let AdmissionDecision::Granted(permit) = decision {
            info!(task_id, "manual run dispatched");
            self.dispatch(task.definition, permit, self.inner.clock.now())?;
        }
        Ok(verdict)
    }

    fn dispatch(
        &self,
        definition: TaskDefinition,
        permit: super::coordinator::AdmissionPermit,
        started_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.inner.registry.update(&definition.task_id, |_, rt| {
            rt.running = true;
            rt.last_run_at = Some(started_at);
        })?;
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        debug!(task_id = %definition.task_id, "dispatching");
        let inner = Arc::clone(&self.inner);
        self.spawner.spawn(async move {
            inner.execute(definition, permit, started_at).await;
        });
        Ok(())
    }

    /// Take a load sample and update the coordination mode.
    pub fn sample_load(&self) -> SystemLoadSnapshot {
        let running = self.inner.coordinator.running_count();
        self.monitor().sample(running, self.inner.clock.now())
    }

    /// Wait until no execution is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Executions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of one task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn get_task(&self, task_id: &str) -> Result<TaskSnapshot, EngineError> {
        self.inner.registry.get(task_id)
    }

    /// Tasks ordered by priority, then id.
    pub fn list_tasks(&self, include_disabled: bool) -> Vec<TaskSnapshot> {
        self.inner.registry.list(include_disabled)
    }

    /// Recent results, newest first.
    pub fn get_execution_history(&self, filter: &HistoryFilter, limit: usize) -> Vec<TaskExecutionResult> {
        self.inner.history.recent(filter, limit)
    }

    /// Enable a task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn enable_task(&self, task_id: &str) -> Result<(), EngineError> {
        self.inner.registry.enable(task_id)?;
        info!(task_id, "task enabled");
        Ok(())
    }

    /// Disable a task. An in-flight execution finishes normally.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn disable_task(&self, task_id: &str) -> Result<(), EngineError> {
        self.inner.registry.disable(task_id)?;
        info!(task_id, "task disabled");
        Ok(())
    }

    /// Zero the failure streak and lift an auto-disable.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn reset_task_failures(&self, task_id: &str) -> Result<(), EngineError> {
        self.inner.registry.reset_failures(task_id)?;
        info!(task_id, "failure counter reset");
        Ok(())
    }

    /// Update a task's retry policy.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` or `InvalidRetryConfig`.
    pub fn update_retry_config(
        &self,
        task_id: &str,
        update: RetryConfigUpdate,
    ) -> Result<RetryPolicy, EngineError> {
        let policy = self.inner.registry.update_retry_config(task_id, update)?;
        info!(task_id, ?policy, "retry policy updated");
        Ok(policy)
    }

    /// Coordinator status for the reporting layer.
    pub fn coordination_status(&self) -> CoordinationStatus {
        self.inner.coordinator.get_coordination_status()
    }

    /// The coordinator.
    pub fn coordinator(&self) -> &Arc<TaskCoordinator> {
        &self.inner.coordinator
    }

    /// The load monitor.
    pub fn monitor(&self) -> &Arc<LoadMonitor> {
        self.inner.coordinator.monitor()
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Whether shutdown was requested.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_shut_down() {
            Err(EngineError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn request_shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
    }
}

impl<S> TaskScheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Spawn the tick loop and the load-monitor ticker.
    pub fn start(&self) -> SchedulerHandle<S> {
        let (stop_tx, stop_rx) = watch::channel(false);
        info!(
            tasks = self.inner.registry.len(),
            tick_ms = self.inner.config.tick_interval_ms,
            "scheduler started"
        );

        let scheduler = self.clone();
        let mut stop = stop_rx.clone();
        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.inner.config.tick_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.tick() {
                            Ok(_) => {}
                            Err(EngineError::Shutdown) => break,
                            Err(e) => error!(error = %e, "tick failed"),
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            debug!("tick loop stopped");
        });

        let scheduler = self.clone();
        let mut stop = stop_rx;
        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.monitor().config().sample_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = scheduler.sample_load();
                        debug!(
                            running = snapshot.running_tasks,
                            failure_rate = snapshot.failure_rate,
                            mode = ?snapshot.mode,
                            "load sampled"
                        );
                    }
                    _ = stop.changed() => break,
                }
            }
            debug!("load monitor stopped");
        });

        SchedulerHandle {
            scheduler: self.clone(),
            stop: stop_tx,
        }
    }
}

/// Handle to a started scheduler.
pub struct SchedulerHandle<S: Spawn = TokioSpawner> {
    scheduler: TaskScheduler<S>,
    stop: watch::Sender<bool>,
}

impl<S: Spawn> SchedulerHandle<S> {
    /// The running scheduler.
    pub const fn scheduler(&self) -> &TaskScheduler<S> {
        &self.scheduler
    }

    /// Stop both loops, refuse new work and wait for in-flight executions.
    pub async fn shutdown(self) {
        self.scheduler.request_shutdown();
        let _ = self.stop.send(true);
        self.scheduler.wait_idle().await;
        info!("scheduler stopped");
    }
}

impl SchedulerInner {
    fn finish_in_flight(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}
