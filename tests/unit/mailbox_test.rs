//! Tests for result mailboxes

use std::time::Duration;

use chrono::Utc;
use fleet_orchestrator::core::{ExecutionStatus, FailureKind, ResultSink, TaskExecutionResult};
use fleet_orchestrator::infra::{BroadcastMailbox, InMemoryMailbox};

fn completed(task_id: &str) -> TaskExecutionResult {
    let now = Utc::now();
    TaskExecutionResult::completed(task_id, now, now, Duration::from_millis(5), serde_json::json!({"ok": true}))
}

fn timed_out(task_id: &str) -> TaskExecutionResult {
    let now = Utc::now();
    TaskExecutionResult::failed(task_id, now, now, Duration::from_secs(1), FailureKind::Timeout, "timed out")
}

#[test]
fn test_in_memory_mailbox_fetch_by_task() {
    let mailbox = InMemoryMailbox::new(10);
    mailbox.publish(&completed("a"));
    mailbox.publish(&timed_out("a"));
    mailbox.publish(&completed("b"));
    assert_eq!(mailbox.fetch("a", None, 10).len(), 2);
    assert_eq!(mailbox.fetch("a", None, 1)[0].status, ExecutionStatus::Completed);
    assert_eq!(mailbox.count_status(ExecutionStatus::Timeout), 1);
    assert_eq!(mailbox.len(), 3);
}

#[test]
fn test_in_memory_mailbox_since_filter() {
    let mailbox = InMemoryMailbox::new(10);
    mailbox.publish(&completed("a"));
    let later = Utc::now() + chrono::Duration::seconds(60);
    assert!(mailbox.fetch("a", Some(later), 10).is_empty());
}

#[tokio::test]
async fn test_broadcast_mailbox_fans_out() {
    let mailbox = BroadcastMailbox::new(8);
    let mut first = mailbox.subscribe();
    let mut second = mailbox.subscribe();
    assert_eq!(mailbox.subscriber_count(), 2);

    mailbox.publish(&completed("health_check"));
    assert_eq!(first.recv().await.unwrap().task_id, "health_check");
    assert_eq!(second.recv().await.unwrap().task_id, "health_check");
}

#[test]
fn test_broadcast_without_subscribers_is_silent() {
    let mailbox = BroadcastMailbox::new(1);
    mailbox.publish(&completed("a"));
    assert_eq!(mailbox.subscriber_count(), 0);
}
