//! Engine configuration structures.
//!
//! Every field has a default so partial JSON documents and bare environments
//! both produce a usable configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::serde::{Priority, ResourceKind};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "FLEET_ENGINE_CONFIG";

/// Retry delay growth between consecutive failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Every retry waits `retry_delay`.
    #[default]
    Fixed,
    /// Retry `n` waits `retry_delay * 2^(n-1)`, capped at `max_retry_delay_secs`.
    Exponential,
}

impl FromStr for RetryBackoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown retry backoff `{other}`")),
        }
    }
}

/// Timer loop and dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the due-task evaluation loop in milliseconds.
    pub tick_interval_ms: u64,
    /// Timeout applied to tasks that do not set their own.
    pub default_timeout_secs: u64,
    /// Retry delay growth.
    pub retry_backoff: RetryBackoff,
    /// Upper bound for exponential retry delays.
    pub max_retry_delay_secs: u64,
    /// Capacity of the execution-history ring.
    pub history_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            default_timeout_secs: 60,
            retry_backoff: RetryBackoff::Fixed,
            max_retry_delay_secs: 600,
            history_capacity: 1_000,
        }
    }
}

impl SchedulerConfig {
    /// Tick period.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Default execution timeout.
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Cap for exponential retry delays.
    pub const fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    /// Validate scheduler settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.default_timeout_secs == 0 {
            return Err("default_timeout_secs must be greater than 0".into());
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".into());
        }
        Ok(())
    }
}

/// Load sampling and mode thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadMonitorConfig {
    /// Seconds between load samples.
    pub sample_interval_secs: u64,
    /// Sliding window for the failure rate, in seconds.
    pub failure_window_secs: u64,
    /// Outcomes required in the window before the failure rate counts.
    pub min_samples: usize,
    /// Failure rate above which the mode is at least `HighLoad`.
    pub failure_rate_warning: f64,
    /// Failure rate above which the mode is `Emergency`.
    pub failure_rate_critical: f64,
    /// Running count at which the mode is at least `HighLoad`.
    pub soft_cap: usize,
    /// Running count at which the mode is `Emergency`.
    pub hard_cap: usize,
}

impl Default for LoadMonitorConfig {
    fn default() -> Self {
        let soft_cap = num_cpus::get().max(1) * 2;
        Self {
            sample_interval_secs: 10,
            failure_window_secs: 300,
            min_samples: 5,
            failure_rate_warning: 0.25,
            failure_rate_critical: 0.5,
            soft_cap,
            hard_cap: soft_cap * 2,
        }
    }
}

impl LoadMonitorConfig {
    /// Sampling period.
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    /// Failure-rate window.
    pub const fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    /// Validate thresholds.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_interval_secs == 0 {
            return Err("sample_interval_secs must be greater than 0".into());
        }
        if self.failure_window_secs == 0 {
            return Err("failure_window_secs must be greater than 0".into());
        }
        for (name, v) in [
            ("failure_rate_warning", self.failure_rate_warning),
            ("failure_rate_critical", self.failure_rate_critical),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{name} must be within 0.0..=1.0"));
            }
        }
        if self.failure_rate_warning >= self.failure_rate_critical {
            return Err("failure_rate_warning must be below failure_rate_critical".into());
        }
        if self.soft_cap == 0 || self.soft_cap >= self.hard_cap {
            return Err("soft_cap must be greater than 0 and below hard_cap".into());
        }
        Ok(())
    }
}

/// Admission policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Highest priority value still considered critical; critical tasks keep
    /// running in `Emergency` mode.
    pub critical_priority_max: Priority,
    /// Resource categories that admit a single holder.
    pub exclusive_resources: Vec<ResourceKind>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            critical_priority_max: 1,
            exclusive_resources: vec![ResourceKind::SshConnection, ResourceKind::Database],
        }
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timer loop and dispatch.
    pub scheduler: SchedulerConfig,
    /// Load sampling.
    pub load: LoadMonitorConfig,
    /// Admission policy.
    pub coordinator: CoordinatorConfig,
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.load.validate().map_err(|e| format!("load invalid: {e}"))?;
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment.
    ///
    /// A `.env` file is loaded first if present. When `FLEET_ENGINE_CONFIG`
    /// names a JSON file it is the base, otherwise defaults are. `FLEET_*`
    /// variables override individual fields.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read {path}: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error in {path}: {e}"))?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `FLEET_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        let s = &mut self.scheduler;
        override_field(&lookup, "FLEET_TICK_INTERVAL_MS", &mut s.tick_interval_ms)?;
        override_field(&lookup, "FLEET_DEFAULT_TIMEOUT_SECS", &mut s.default_timeout_secs)?;
        override_field(&lookup, "FLEET_RETRY_BACKOFF", &mut s.retry_backoff)?;
        override_field(&lookup, "FLEET_MAX_RETRY_DELAY_SECS", &mut s.max_retry_delay_secs)?;
        override_field(&lookup, "FLEET_HISTORY_CAPACITY", &mut s.history_capacity)?;

        let l = &mut self.load;
        override_field(&lookup, "FLEET_SAMPLE_INTERVAL_SECS", &mut l.sample_interval_secs)?;
        override_field(&lookup, "FLEET_FAILURE_WINDOW_SECS", &mut l.failure_window_secs)?;
        override_field(&lookup, "FLEET_MIN_SAMPLES", &mut l.min_samples)?;
        override_field(&lookup, "FLEET_FAILURE_RATE_WARNING", &mut l.failure_rate_warning)?;
        override_field(&lookup, "FLEET_FAILURE_RATE_CRITICAL", &mut l.failure_rate_critical)?;
        override_field(&lookup, "FLEET_SOFT_CAP", &mut l.soft_cap)?;
        override_field(&lookup, "FLEET_HARD_CAP", &mut l.hard_cap)?;

        override_field(
            &lookup,
            "FLEET_CRITICAL_PRIORITY_MAX",
            &mut self.coordinator.critical_priority_max,
        )?;
        Ok(())
    }
}

fn override_field<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| format!("{key}={raw}: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn overrides_apply_and_parse() {
        let vars: HashMap<&str, &str> = [
            ("FLEET_TICK_INTERVAL_MS", "250"),
            ("FLEET_RETRY_BACKOFF", "Exponential"),
            ("FLEET_HARD_CAP", "64"),
        ]
        .into();
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(cfg.scheduler.tick_interval_ms, 250);
        assert_eq!(cfg.scheduler.retry_backoff, RetryBackoff::Exponential);
        assert_eq!(cfg.load.hard_cap, 64);
    }

    #[test]
    fn bad_override_names_the_variable() {
        let mut cfg = EngineConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == "FLEET_SOFT_CAP").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.contains("FLEET_SOFT_CAP"));
    }
}
