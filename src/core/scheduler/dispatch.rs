//! Execution of one admitted attempt and the completion transition.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::SchedulerInner;
use crate::core::coordinator::AdmissionPermit;
use crate::core::executor::{SecurityVerdict, WorkError};
use crate::core::history::{ExecutionStatus, FailureKind, TaskExecutionResult};
use crate::core::registry::{DisableReason, TaskDefinition};
use crate::util::clock::after;

enum AttemptError {
    Blocked(String),
    Work(WorkError),
}

impl SchedulerInner {
    /// Run one admitted attempt to its end and apply the outcome.
    pub(super) async fn execute(
        self: Arc<Self>,
        definition: TaskDefinition,
        permit: AdmissionPermit,
        started_at: DateTime<Utc>,
    ) {
        let timer = tokio::time::Instant::now();
        let timeout = definition
            .timeout
            .unwrap_or_else(|| self.config.default_timeout());
        let outcome = self.attempt(&definition, timeout).await;
        let duration = timer.elapsed();
        let end = self.clock.now();

        let task_id = definition.task_id.as_str();
        let result = match outcome {
            Ok(data) => TaskExecutionResult::completed(task_id, started_at, end, duration, data),
            Err((kind, message)) => {
                TaskExecutionResult::failed(task_id, started_at, end, duration, kind, message)
            }
        };

        self.apply_outcome(&definition, &result, end);
        if result.failure_kind != Some(FailureKind::SecurityBlocked) {
            self.coordinator
                .monitor()
                .record_outcome(end, result.counts_as_failure());
        }
        self.history.record(result.clone());
        permit.complete(result.status);
        if let Some(sink) = &self.sink {
            sink.publish(&result);
        }
        self.finish_in_flight();
    }

    /// Security check plus work unit, under the timeout, in a task of its
    /// own so panics surface as join errors. On timeout the task is left
    /// running detached.
    ///
    /// Spawned with `tokio::spawn` rather than the scheduler's [`Spawn`]:
    /// `Spawn` is fire-and-forget, and this needs the `JoinHandle` to await
    /// the result and detect panics through `JoinError::is_panic`.
    ///
    /// [`Spawn`]: crate::core::Spawn
    async fn attempt(
        &self,
        definition: &TaskDefinition,
        timeout: Duration,
    ) -> Result<Value, (FailureKind, String)> {
        let work = Arc::clone(&definition.work);
        let security = self.security.clone();
        let task_id = definition.task_id.clone();
        let task_type = definition.task_type.clone();

        let handle = tokio::spawn(async move {
            if let Some(hook) = security {
                if let SecurityVerdict::Denied(reason) = hook.authorize(&task_id, &task_type).await {
                    return Err(AttemptError::Blocked(reason));
                }
            }
            work.run().await.map_err(AttemptError::Work)
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(AttemptError::Blocked(reason)))) => {
                Err((FailureKind::SecurityBlocked, format!("security blocked: {reason}")))
            }
            Ok(Ok(Err(AttemptError::Work(e)))) => Err((FailureKind::WorkUnit, e.to_string())),
            Ok(Err(join)) if join.is_panic() => Err((
                FailureKind::Panicked,
                format!("work unit panicked: {}", panic_message(join.into_panic().as_ref())),
            )),
            Ok(Err(join)) => Err((FailureKind::WorkUnit, format!("work unit cancelled: {join}"))),
            Err(_) => Err((
                FailureKind::Timeout,
                format!("timed out after {:.3}s", timeout.as_secs_f64()),
            )),
        }
    }

    /// Update failure counters, `next_run_at` and the enabled flag.
    fn apply_outcome(&self, definition: &TaskDefinition, result: &TaskExecutionResult, end: DateTime<Utc>) {
        let task_id = definition.task_id.as_str();
        let multiplier = self.coordinator.interval_multiplier();
        let backoff = self.config.retry_backoff;
        let cap = self.config.max_retry_delay();

        let applied = self.registry.update(task_id, |def, rt| {
            rt.running = false;
            rt.total_runs += 1;
            rt.last_status = Some(result.status);
            let normal = after(end, def.interval.saturating_mul(multiplier));

            match (result.status, result.failure_kind) {
                (ExecutionStatus::Completed, _) => {
                    rt.consecutive_failures = 0;
                    rt.last_error = None;
                    rt.next_run_at = normal;
                    None
                }
                (_, Some(FailureKind::SecurityBlocked)) => {
                    rt.last_error.clone_from(&result.error_message);
                    rt.next_run_at = normal;
                    None
                }
                _ => {
                    rt.consecutive_failures = rt.consecutive_failures.saturating_add(1);
                    rt.last_error.clone_from(&result.error_message);
                    let policy = def.retry;
                    rt.next_run_at = if rt.consecutive_failures <= policy.max_retries {
                        after(end, policy.delay_for(rt.consecutive_failures, backoff, cap))
                    } else {
                        normal
                    };
                    if def.enabled && rt.consecutive_failures >= policy.auto_disable_threshold {
                        def.enabled = false;
                        rt.disabled_reason = Some(DisableReason::AutoDisabled {
                            consecutive_failures: rt.consecutive_failures,
                            last_error: rt.last_error.clone(),
                        });
                        return Some(rt.consecutive_failures);
                    }
                    None
                }
            }
        });

        match (result.status, &result.error_message) {
            (ExecutionStatus::Completed, _) => {
                debug!(task_id, duration_ms = result.duration.as_millis(), "task completed");
            }
            (status, message) => warn!(
                task_id,
                ?status,
                kind = ?result.failure_kind,
                error = message.as_deref().unwrap_or_default(),
                "task failed"
            ),
        }

        match applied {
            Ok(Some(failures)) => info!(
                task_id,
                consecutive_failures = failures,
                "task auto-disabled after consecutive failures"
            ),
            Ok(None) => {}
            Err(e) => warn!(task_id, error = %e, "completion for unregistered task"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
