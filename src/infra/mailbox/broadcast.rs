//! Broadcast mailbox: real-time fan-out over a tokio broadcast channel.

use tokio::sync::broadcast;
use tracing::trace;

use crate::core::{ResultSink, TaskExecutionResult};

/// Fans finished results out to any number of live subscribers.
///
/// Publishing never blocks the scheduler. Subscribers that fall more than
/// `capacity` results behind observe `RecvError::Lagged` and skip ahead.
#[derive(Clone)]
pub struct BroadcastMailbox {
    tx: broadcast::Sender<TaskExecutionResult>,
}

impl BroadcastMailbox {
    /// Create a channel buffering `capacity` results per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to results published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskExecutionResult> {
        self.tx.subscribe()
    }

    /// Live subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ResultSink for BroadcastMailbox {
    fn publish(&self, result: &TaskExecutionResult) {
        if self.tx.send(result.clone()).is_err() {
            trace!(task_id = %result.task_id, "no subscribers for result");
        }
    }
}
