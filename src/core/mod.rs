//! Core engine components: registry, ledger, dependency graph, load monitor,
//! coordinator and scheduler.

pub mod coordinator;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod history;
pub mod ledger;
pub mod load;
pub mod registry;
pub mod scheduler;

pub use coordinator::{
    AdmissionDecision, AdmissionPermit, AdmissionVerdict, CoordinationCounters, CoordinationStatus,
    DeferReason, DenyReason, TaskCoordinator,
};
pub use dependency::{DependencyGraph, StartBlocker, TaskDependency};
pub use error::{AppResult, EngineError};
pub use executor::{
    BlockingWorkUnit, CollectionError, CollectionLayer, CollectorWorkUnit, FnWorkUnit, ResultSink,
    SecurityHook, SecurityVerdict, Spawn, WorkError, WorkUnit,
};
pub use history::{
    ExecutionHistory, ExecutionStatus, FailureKind, HistoryFilter, HistoryStats, TaskExecutionResult,
};
pub use ledger::{LockMode, ResourceLedger, ResourceLock};
pub use load::{assess_mode, CoordinationMode, HostLoadProbe, LoadMonitor, SystemLoadSnapshot};
pub use registry::{
    DisableReason, RetryConfigUpdate, RetryPolicy, TaskDefinition, TaskRegistry, TaskRuntimeState,
    TaskSnapshot,
};
pub use scheduler::{FailedTask, HealthSummary, SchedulerHandle, TaskScheduler, TickReport};
