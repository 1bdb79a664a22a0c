//! Tests for engine assembly

use std::sync::Arc;

use fleet_orchestrator::builders::{fleet_catalog, EngineBuilder};
use fleet_orchestrator::config::EngineConfig;
use fleet_orchestrator::core::{EngineError, FnWorkUnit, TaskDefinition, WorkUnit};
use fleet_orchestrator::infra::InMemoryCollector;
use fleet_orchestrator::util::ResourceKind;

fn noop() -> Arc<dyn WorkUnit> {
    Arc::new(FnWorkUnit::new(|| async { Ok(serde_json::Value::Null) }))
}

#[tokio::test]
async fn test_fleet_catalog_builds() {
    let scheduler = EngineBuilder::new()
        .with_tasks(fleet_catalog(Arc::new(InMemoryCollector::new())))
        .build()
        .unwrap();
    let tasks = scheduler.list_tasks(true);
    assert_eq!(tasks.len(), 6);
    assert_eq!(tasks[0].definition.task_id, "health_check");
    let status = scheduler.coordination_status();
    assert_eq!(status.dependency_count, 3);
    assert!(status.dependency_map["metrics_collection"]
        .conflicts_with
        .contains("log_scan"));
}

#[tokio::test]
async fn test_duplicate_task_id_fails() {
    let err = EngineBuilder::new()
        .with_task(TaskDefinition::new("a", noop()))
        .with_task(TaskDefinition::new("a", noop()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::DuplicateTask(id) if id == "a"));
}

#[tokio::test]
async fn test_cycle_fails_fast() {
    let err = EngineBuilder::new()
        .with_task(TaskDefinition::new("a", noop()).depends_on("b"))
        .with_task(TaskDefinition::new("b", noop()).depends_on("a"))
        .build()
        .err()
        .unwrap();
    assert!(err.is_configuration());
    assert!(matches!(err, EngineError::CyclicDependency { .. }));
}

#[tokio::test]
async fn test_unknown_dependency_fails() {
    let err = EngineBuilder::new()
        .with_task(TaskDefinition::new("a", noop()).depends_on("ghost"))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::UnknownDependency { .. }));
}

#[tokio::test]
async fn test_invalid_config_fails() {
    let mut config = EngineConfig::default();
    config.scheduler.tick_interval_ms = 0;
    let err = EngineBuilder::new().with_config(config).build().err().unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[test]
fn test_build_outside_runtime_fails() {
    let err = EngineBuilder::new()
        .with_task(TaskDefinition::new("a", noop()).requires(ResourceKind::Database))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(msg) if msg.contains("tokio")));
}
