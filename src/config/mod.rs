//! Configuration models for the scheduler, load monitor, and coordinator.

pub mod engine;

pub use engine::{CoordinatorConfig, EngineConfig, LoadMonitorConfig, RetryBackoff, SchedulerConfig};
