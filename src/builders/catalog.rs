//! Standard fleet-monitoring task catalog.
//!
//! | task                | every  | priority | needs                       |
//! |---------------------|--------|----------|-----------------------------|
//! | `health_check`      | 30 s   | 0        | ssh                         |
//! | `metrics_collection`| 60 s   | 1        | ssh, network; after health  |
//! | `disk_usage`        | 5 min  | 3        | ssh; after health           |
//! | `log_scan`          | 10 min | 5        | ssh, cpu; not with metrics  |
//! | `service_inventory` | 1 h    | 7        | ssh, database               |
//! | `history_cleanup`   | 1 day  | 9        | database                    |

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::core::{CollectionLayer, CollectorWorkUnit, RetryPolicy, TaskDefinition};
use crate::util::serde::ResourceKind;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// The standard fleet task set, delegating to `collector`.
pub fn fleet_catalog(collector: Arc<dyn CollectionLayer>) -> Vec<TaskDefinition> {
    let unit = |task_type: &str, params: serde_json::Value| {
        Arc::new(CollectorWorkUnit::new(Arc::clone(&collector), task_type, params))
    };

    vec![
        TaskDefinition::new("health_check", unit("health_check", json!({ "checks": ["ping", "uptime"] })))
            .name("Host health check")
            .task_type("health_check")
            .interval(Duration::from_secs(30))
            .timeout(Duration::from_secs(15))
            .priority(0)
            .requires(ResourceKind::SshConnection)
            .retry(RetryPolicy {
                max_retries: 2,
                retry_delay_seconds: 10,
                auto_disable_threshold: 10,
            })
            .estimated_duration(Duration::from_secs(2)),
        TaskDefinition::new("metrics_collection", unit("metrics", json!({ "series": ["cpu", "memory", "load"] })))
            .name("System metrics collection")
            .task_type("metrics")
            .interval(Duration::from_secs(MINUTE))
            .timeout(Duration::from_secs(30))
            .priority(1)
            .depends_on("health_check")
            .requires(ResourceKind::SshConnection)
            .requires(ResourceKind::NetworkIo)
            .estimated_duration(Duration::from_secs(5)),
        TaskDefinition::new("disk_usage", unit("disk_usage", json!({ "mounts": "all" })))
            .name("Disk usage report")
            .task_type("disk_usage")
            .interval(Duration::from_secs(5 * MINUTE))
            .priority(3)
            .depends_on("health_check")
            .requires(ResourceKind::SshConnection)
            .estimated_duration(Duration::from_secs(8)),
        TaskDefinition::new("log_scan", unit("log_scan", json!({ "paths": ["/var/log/syslog"], "lines": 500 })))
            .name("Error log scan")
            .task_type("log_scan")
            .interval(Duration::from_secs(10 * MINUTE))
            .timeout(Duration::from_secs(120))
            .priority(5)
            .conflicts_with("metrics_collection")
            .requires(ResourceKind::SshConnection)
            .requires(ResourceKind::CpuIntensive)
            .estimated_duration(Duration::from_secs(30)),
        TaskDefinition::new("service_inventory", unit("service_inventory", json!({})))
            .name("Service inventory")
            .task_type("service_inventory")
            .interval(Duration::from_secs(HOUR))
            .timeout(Duration::from_secs(180))
            .priority(7)
            .depends_on("health_check")
            .requires(ResourceKind::SshConnection)
            .requires(ResourceKind::Database)
            .estimated_duration(Duration::from_secs(45)),
        TaskDefinition::new("history_cleanup", unit("history_cleanup", json!({ "retain_days": 30 })))
            .name("Result history cleanup")
            .task_type("history_cleanup")
            .interval(Duration::from_secs(24 * HOUR))
            .priority(9)
            .requires(ResourceKind::Database)
            .retry(RetryPolicy {
                max_retries: 1,
                retry_delay_seconds: 15 * MINUTE,
                auto_disable_threshold: 3,
            })
            .estimated_duration(Duration::from_secs(20)),
    ]
}
