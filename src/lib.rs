//! # Fleet Orchestrator
//!
//! Dependency- and resource-aware periodic task orchestration for fleet
//! monitoring.
//!
//! A fleet monitor runs a fixed catalog of recurring diagnostic tasks against
//! remote hosts: health checks, metric collection, disk and log inspection.
//! Running them naively on timers lets tasks pile onto the same scarce remote
//! session, start before the data they need exists, and keep hammering a
//! failing host. This crate decides *when* each task may run.
//!
//! ## Components
//!
//! - **Task Registry**: catalog of definitions plus mutable runtime state
//!   (enabled flag, failure streak, next due time).
//! - **Resource Ledger**: which in-flight task holds which resource category;
//!   all-or-nothing acquisition, exclusive or shared.
//! - **Dependency Graph**: `depends_on`, `conflicts_with`, required resources
//!   and priority per task; validated for cycles at startup.
//! - **Load Monitor**: samples running count and windowed failure rate and
//!   derives the coordination mode (`normal`, `high_load`, `emergency`).
//! - **Task Coordinator**: admits, defers or denies a due task under a single
//!   coordination lock.
//! - **Task Scheduler**: timer loop, dispatch under a hard timeout, result
//!   history, retry and auto-disable policy.
//!
//! ## Admission
//!
//! For each due task, in `(priority, task_id)` order:
//!
//! 1. disabled: `denied(disabled)`
//! 2. `emergency` mode and outside the critical band: `deferred(emergency_mode)`
//! 3. dependency not last completed, or a conflicting task running:
//!    `deferred(dependency_or_conflict)`
//! 4. resources unavailable: `deferred(resource_contention)`
//! 5. otherwise `granted`, holding an [`core::AdmissionPermit`] that releases
//!    every resource exactly once when the execution ends.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleet_orchestrator::builders::{fleet_catalog, EngineBuilder};
//! use fleet_orchestrator::infra::InMemoryCollector;
//!
//! #[tokio::main]
//! async fn main() -> fleet_orchestrator::core::AppResult<()> {
//!     fleet_orchestrator::util::init_tracing();
//!     let collector = Arc::new(InMemoryCollector::new());
//!     let scheduler = EngineBuilder::from_env()?
//!         .with_tasks(fleet_catalog(collector))
//!         .build()?;
//!     let handle = scheduler.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - End-to-end scheduling behavior
//! - `tests/coordinator_test.rs` - Concurrent admission stress

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Engine components: registry, ledger, graph, load monitor, coordinator, scheduler.
pub mod core;
/// Configuration models for the scheduler, load monitor and coordinator.
pub mod config;
/// Builders to assemble an engine from configuration and a task catalog.
pub mod builders;
/// Infrastructure adapters for result mailboxes, host load and collection.
pub mod infra;
/// Runtime spawner and the reporting/administration API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
