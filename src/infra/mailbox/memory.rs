//! In-memory result mailbox.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::{ExecutionStatus, ResultSink, TaskExecutionResult};

/// Bounded in-memory mailbox for development/testing.
///
/// Keeps the most recent `capacity` results; older ones are dropped.
pub struct InMemoryMailbox {
    capacity: usize,
    messages: Mutex<VecDeque<TaskExecutionResult>>,
}

impl InMemoryMailbox {
    /// Create a mailbox keeping at most `capacity` results (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Results for a task, optionally finished at or after `since`, oldest first.
    pub fn fetch(&self, task_id: &str, since: Option<DateTime<Utc>>, limit: usize) -> Vec<TaskExecutionResult> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.task_id == task_id)
            .filter(|m| since.is_none_or(|s| m.end_time >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Every retained result, oldest first.
    pub fn all(&self) -> Vec<TaskExecutionResult> {
        self.messages.lock().iter().cloned().collect()
    }

    /// Retained results with the given status.
    pub fn count_status(&self, status: ExecutionStatus) -> usize {
        self.messages.lock().iter().filter(|m| m.status == status).count()
    }

    /// Number of retained results.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl ResultSink for InMemoryMailbox {
    fn publish(&self, result: &TaskExecutionResult) {
        let mut messages = self.messages.lock();
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(result.clone());
    }
}
