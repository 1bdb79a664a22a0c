//! Runtime adapters and the reporting/administration API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{health_report, recommendations, HealthReport, HistoryQuery, Recommendation, Severity, TaskSummary};
pub use tokio_spawner::TokioSpawner;
