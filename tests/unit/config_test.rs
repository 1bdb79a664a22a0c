//! Tests for configuration validation

use fleet_orchestrator::config::{EngineConfig, LoadMonitorConfig, RetryBackoff, SchedulerConfig};
use fleet_orchestrator::util::ResourceKind;

#[test]
fn test_scheduler_config_validation() {
    assert!(SchedulerConfig::default().validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_tick() {
    let invalid = SchedulerConfig {
        tick_interval_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_history_capacity() {
    let invalid = SchedulerConfig {
        history_capacity: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_load_config_thresholds_must_be_ordered() {
    let invalid = LoadMonitorConfig {
        failure_rate_warning: 0.6,
        failure_rate_critical: 0.5,
        ..LoadMonitorConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_load_config_caps_must_be_ordered() {
    let invalid = LoadMonitorConfig {
        soft_cap: 10,
        hard_cap: 10,
        ..LoadMonitorConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_load_config_rate_out_of_range() {
    let invalid = LoadMonitorConfig {
        failure_rate_critical: 1.5,
        ..LoadMonitorConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_engine_config_from_partial_json() {
    let json = r#"{
        "scheduler": { "tick_interval_ms": 250, "retry_backoff": "exponential" },
        "coordinator": { "critical_priority_max": 2, "exclusive_resources": ["ssh_connection"] }
    }"#;
    let cfg = EngineConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.scheduler.tick_interval_ms, 250);
    assert_eq!(cfg.scheduler.retry_backoff, RetryBackoff::Exponential);
    assert_eq!(cfg.scheduler.default_timeout_secs, 60);
    assert_eq!(cfg.coordinator.critical_priority_max, 2);
    assert_eq!(cfg.coordinator.exclusive_resources, vec![ResourceKind::SshConnection]);
}

#[test]
fn test_engine_config_rejects_invalid_json() {
    let err = EngineConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_engine_config_rejects_invalid_values() {
    let err = EngineConfig::from_json_str(r#"{ "load": { "sample_interval_secs": 0 } }"#).unwrap_err();
    assert!(err.contains("load invalid"));
}

#[test]
fn test_default_config_roundtrips_through_json() {
    let cfg = EngineConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed = EngineConfig::from_json_str(&json).unwrap();
    assert_eq!(parsed.load.hard_cap, cfg.load.hard_cap);
}
