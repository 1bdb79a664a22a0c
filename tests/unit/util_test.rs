//! Tests for utility functions

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_orchestrator::util::clock::{after, to_chrono};
use fleet_orchestrator::util::telemetry::{env_filter_or, DEFAULT_FILTER};
use fleet_orchestrator::util::{init_tracing, Clock, ManualClock, ResourceKind};

#[test]
fn test_manual_clock_advances() {
    let start = Utc::now();
    let clock = ManualClock::new(start);
    clock.advance(Duration::from_secs(30));
    assert_eq!(clock.now() - start, chrono::Duration::seconds(30));
}

#[test]
fn test_manual_clock_shared_between_clones() {
    let clock = ManualClock::starting_now();
    let other = clock.clone();
    other.advance(Duration::from_secs(5));
    assert_eq!(clock.now(), other.now());
}

#[test]
fn test_after_saturates() {
    let end = after(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1));
    assert_eq!(end, DateTime::<Utc>::MAX_UTC);
    assert_eq!(to_chrono(Duration::from_millis(1500)).num_milliseconds(), 1500);
}

#[test]
fn test_resource_kind_names() {
    assert_eq!(ResourceKind::SshConnection.as_str(), "ssh_connection");
    assert_eq!(ResourceKind::ALL.len(), 5);
    let parsed: ResourceKind = serde_json::from_str("\"network_io\"").unwrap();
    assert_eq!(parsed, ResourceKind::NetworkIo);
}

#[test]
fn test_init_tracing_is_idempotent() {
    let _ = init_tracing();
    assert!(!init_tracing());
    let filter = env_filter_or(DEFAULT_FILTER);
    assert!(!filter.to_string().is_empty());
}
