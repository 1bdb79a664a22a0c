//! Tests for the administration API surface

use std::sync::Arc;
use std::time::Duration;

use fleet_orchestrator::builders::EngineBuilder;
use fleet_orchestrator::core::{
    AdmissionVerdict, DeferReason, ExecutionStatus, FnWorkUnit, RetryConfigUpdate, TaskDefinition,
    TaskScheduler, WorkError, WorkUnit,
};
use fleet_orchestrator::runtime::api::{self, HistoryQuery, Severity};
use fleet_orchestrator::util::{ManualClock, ResourceKind};

fn ok_unit() -> Arc<dyn WorkUnit> {
    Arc::new(FnWorkUnit::new(|| async { Ok(serde_json::json!({"ok": true})) }))
}

fn failing_unit() -> Arc<dyn WorkUnit> {
    Arc::new(FnWorkUnit::new(|| async { Err(WorkError::Failed("host unreachable".into())) }))
}

fn scheduler(tasks: Vec<TaskDefinition>) -> TaskScheduler {
    EngineBuilder::new()
        .with_clock(Arc::new(ManualClock::starting_now()))
        .with_tasks(tasks)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_list_tasks_summaries_in_priority_order() {
    let s = scheduler(vec![
        TaskDefinition::new("b", ok_unit()).priority(2).interval(Duration::from_secs(90)),
        TaskDefinition::new("a", ok_unit()).priority(2),
        TaskDefinition::new("z", ok_unit()).priority(0).enabled(false),
    ]);
    let all = api::list_tasks(&s, true);
    let ids: Vec<_> = all.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, ["z", "a", "b"]);
    assert_eq!(all[2].interval_seconds, 90);
    assert_eq!(api::list_tasks(&s, false).len(), 2);
    assert!(api::task_detail(&s, "missing").is_err());
}

#[tokio::test]
async fn test_history_query_filters_by_status() {
    let s = scheduler(vec![
        TaskDefinition::new("good", ok_unit()).priority(1),
        TaskDefinition::new("bad", failing_unit()).priority(2),
    ]);
    s.tick().unwrap();
    s.wait_idle().await;

    let failed = api::execution_history(
        &s,
        &HistoryQuery {
            status: Some(ExecutionStatus::Failed),
            ..HistoryQuery::default()
        },
    );
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].task_id, "bad");
    assert_eq!(api::execution_history(&s, &HistoryQuery::default()).len(), 2);
}

#[test]
fn test_history_query_defaults_from_json() {
    let q: HistoryQuery = serde_json::from_str(r#"{ "task_id": "disk_usage" }"#).unwrap();
    assert_eq!(q.limit, 50);
    assert_eq!(q.task_id.as_deref(), Some("disk_usage"));
}

#[test]
fn test_admission_verdict_wire_format() {
    let v = serde_json::to_value(AdmissionVerdict::Deferred(DeferReason::ResourceContention)).unwrap();
    assert_eq!(v, serde_json::json!({"decision": "deferred", "reason": "resource_contention"}));
}

#[tokio::test]
async fn test_run_now_reports_contention() {
    let s = scheduler(vec![
        TaskDefinition::new("holder", Arc::new(FnWorkUnit::new(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(serde_json::Value::Null)
        })))
        .priority(1)
        .requires(ResourceKind::SshConnection),
        TaskDefinition::new("waiter", ok_unit())
            .priority(2)
            .requires(ResourceKind::SshConnection)
            .enabled(false),
    ]);
    assert_eq!(api::run_task_now(&s, "holder").unwrap(), AdmissionVerdict::Granted);
    api::enable_task(&s, "waiter").unwrap();
    assert_eq!(
        api::run_task_now(&s, "waiter").unwrap(),
        AdmissionVerdict::Deferred(DeferReason::ResourceContention)
    );
    s.wait_idle().await;
    assert_eq!(api::run_task_now(&s, "waiter").unwrap(), AdmissionVerdict::Granted);
    s.wait_idle().await;
}

#[tokio::test]
async fn test_update_retry_config_partial() {
    let s = scheduler(vec![TaskDefinition::new("a", ok_unit())]);
    let policy = api::update_retry_config(
        &s,
        "a",
        RetryConfigUpdate {
            retry_delay_seconds: Some(5),
            ..RetryConfigUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(policy.retry_delay_seconds, 5);
    assert_eq!(api::task_detail(&s, "a").unwrap().retry, policy);
}

#[tokio::test]
async fn test_health_report_recommends_on_failures() {
    let s = scheduler(vec![TaskDefinition::new("bad", failing_unit()).retry(
        fleet_orchestrator::core::RetryPolicy {
            max_retries: 0,
            retry_delay_seconds: 0,
            auto_disable_threshold: 1,
        },
    )]);
    s.tick().unwrap();
    s.wait_idle().await;

    let report = api::health_report(&s);
    assert_eq!(report.summary.disabled_tasks, 1);
    assert_eq!(report.failed_tasks.len(), 1);
    assert_eq!(report.recommendations[0].severity, Severity::Critical);
    assert_eq!(report.recommendations[0].task_id.as_deref(), Some("bad"));
}
