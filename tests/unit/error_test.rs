//! Tests for error types

use fleet_orchestrator::core::{EngineError, WorkError, CollectionError};

#[test]
fn test_duplicate_task_error() {
    let err = EngineError::DuplicateTask("health_check".to_string());
    assert_eq!(format!("{}", err), "duplicate task: health_check");
    assert!(err.is_configuration());
}

#[test]
fn test_task_not_found_error() {
    let err = EngineError::TaskNotFound("ghost".to_string());
    assert_eq!(format!("{}", err), "task not found: ghost");
    assert!(!err.is_configuration());
}

#[test]
fn test_cyclic_dependency_names_cycle() {
    let err = EngineError::CyclicDependency {
        cycle: vec!["a".into(), "b".into(), "a".into()],
    };
    assert_eq!(format!("{}", err), "cyclic dependency: a -> b -> a");
    assert!(err.is_configuration());
}

#[test]
fn test_unknown_dependency_error() {
    let err = EngineError::UnknownDependency {
        task_id: "metrics".into(),
        dependency: "ghost".into(),
    };
    assert_eq!(format!("{}", err), "task metrics references unknown task ghost");
}

#[test]
fn test_invalid_retry_config_is_not_fatal() {
    let err = EngineError::InvalidRetryConfig {
        task_id: "t1".into(),
        reason: "auto_disable_threshold must be at least 1".into(),
    };
    assert!(!err.is_configuration());
    assert!(err.to_string().contains("t1"));
}

#[test]
fn test_work_error_from_collection_error() {
    let err: WorkError = CollectionError::ConnectionFailed("host-7".into()).into();
    assert_eq!(format!("{}", err), "collection failed: connection failed: host-7");
}
