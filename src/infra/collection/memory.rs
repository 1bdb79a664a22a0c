//! Scripted in-memory collection layer for development and tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::core::{CollectionError, CollectionLayer};

#[derive(Debug, Clone)]
struct Script {
    response: Result<Value, CollectionError>,
    delay: Duration,
}

/// Collection layer answering from per-task-type scripts.
///
/// Unscripted task types echo their parameters back.
#[derive(Debug, Default)]
pub struct InMemoryCollector {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl InMemoryCollector {
    /// Collector with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `task_type` with `payload`.
    pub fn respond(&self, task_type: &str, payload: Value) {
        self.script(task_type, Ok(payload), Duration::ZERO);
    }

    /// Fail `task_type` with `error`.
    pub fn fail(&self, task_type: &str, error: CollectionError) {
        self.script(task_type, Err(error), Duration::ZERO);
    }

    /// Answer `task_type` with `response` after `delay`.
    pub fn script(&self, task_type: &str, response: Result<Value, CollectionError>, delay: Duration) {
        self.scripts
            .lock()
            .insert(task_type.to_string(), Script { response, delay });
    }

    /// Number of `execute` calls seen for `task_type`.
    pub fn calls(&self, task_type: &str) -> usize {
        self.calls.lock().get(task_type).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CollectionLayer for InMemoryCollector {
    async fn execute(&self, task_type: &str, params: &Value) -> Result<Value, CollectionError> {
        *self.calls.lock().entry(task_type.to_string()).or_default() += 1;
        let script = self.scripts.lock().get(task_type).cloned();
        match script {
            Some(script) => {
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                script.response
            }
            None => Ok(json!({ "task_type": task_type, "params": params })),
        }
    }
}
