//! Assemble a scheduler from configuration, a task catalog and collaborators.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::EngineConfig;
use crate::core::scheduler::SchedulerParts;
use crate::core::{
    AppResult, DependencyGraph, EngineError, HostLoadProbe, LoadMonitor, ResultSink, SecurityHook,
    Spawn, TaskCoordinator, TaskDefinition, TaskRegistry, TaskScheduler,
};
use crate::runtime::TokioSpawner;
use crate::util::clock::{Clock, SystemClock};

/// Builder for a [`TaskScheduler`] with injected collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    tasks: Vec<TaskDefinition>,
    clock: Arc<dyn Clock>,
    security: Option<Arc<dyn SecurityHook>>,
    sink: Option<Arc<dyn ResultSink>>,
    probe: Option<Arc<dyn HostLoadProbe>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Builder with default configuration, the system clock and no tasks.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            tasks: Vec::new(),
            clock: Arc::new(SystemClock),
            security: None,
            sink: None,
            probe: None,
        }
    }

    /// Builder seeded from `.env`, `FLEET_ENGINE_CONFIG` and `FLEET_*` overrides.
    ///
    /// # Errors
    ///
    /// Unreadable or invalid configuration.
    pub fn from_env() -> AppResult<Self> {
        let config = EngineConfig::from_env()
            .map_err(anyhow::Error::msg)
            .context("loading engine configuration from environment")?;
        Ok(Self::new().with_config(config))
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add one task.
    #[must_use]
    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add several tasks.
    #[must_use]
    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = TaskDefinition>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Use a custom clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a security pre-check.
    #[must_use]
    pub fn with_security_hook(mut self, hook: Arc<dyn SecurityHook>) -> Self {
        self.security = Some(hook);
        self
    }

    /// Publish every finished result to `sink`.
    #[must_use]
    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report host load from `probe` in load snapshots.
    #[must_use]
    pub fn with_host_probe(mut self, probe: Arc<dyn HostLoadProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Build on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Configuration errors, or no tokio runtime.
    pub fn build(self) -> Result<TaskScheduler, EngineError> {
        let spawner = TokioSpawner::current()?;
        self.build_with_spawner(spawner)
    }

    /// Build with an explicit spawner.
    ///
    /// Fails fast on invalid configuration, duplicate task ids, references
    /// to unknown tasks and dependency cycles.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`] for which `is_configuration()` holds.
    pub fn build_with_spawner<S: Spawn>(self, spawner: S) -> Result<TaskScheduler<S>, EngineError> {
        self.config.validate().map_err(EngineError::InvalidConfig)?;

        let registry = Arc::new(TaskRegistry::new());
        let first_run_at = self.clock.now();
        let mut profiles = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            profiles.push((task.task_id.clone(), task.dependency.clone()));
            registry.register(task, first_run_at)?;
        }
        let graph = DependencyGraph::new(profiles)?;

        let mut monitor = LoadMonitor::new(self.config.load.clone());
        if let Some(probe) = self.probe {
            monitor = monitor.with_probe(probe);
        }
        let monitor = Arc::new(monitor);

        info!(
            tasks = registry.len(),
            dependencies = graph.dependency_count(),
            "engine assembled"
        );

        let coordinator = Arc::new(TaskCoordinator::new(
            self.config.coordinator.clone(),
            Arc::clone(&registry),
            graph,
            monitor,
        ));

        Ok(TaskScheduler::from_parts(
            SchedulerParts {
                config: self.config.scheduler,
                registry,
                coordinator,
                clock: self.clock,
                security: self.security,
                sink: self.sink,
            },
            spawner,
        ))
    }
}
