//! Load monitor: derives the process-wide coordination mode from observed load.
//!
//! Mode policy, evaluated on every sample:
//! - `Emergency` if the windowed failure rate exceeds the critical threshold
//!   or the running count reaches the hard cap;
//! - `HighLoad` if the failure rate exceeds the warning threshold or the
//!   running count reaches the soft cap;
//! - `Normal` otherwise.
//!
//! No hysteresis is applied; a sample may move the mode in either direction.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LoadMonitorConfig;
use crate::util::clock::to_chrono;

/// Process-wide throttle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    /// Every task runs at its nominal cadence.
    #[default]
    Normal,
    /// Intervals are doubled.
    HighLoad,
    /// Only critical-band tasks are admitted.
    Emergency,
}

impl CoordinationMode {
    /// Factor applied to a task's nominal interval when rescheduling.
    pub const fn interval_multiplier(self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::HighLoad => 2,
            Self::Emergency => 4,
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::HighLoad => 1,
            Self::Emergency => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::HighLoad,
            _ => Self::Emergency,
        }
    }
}

/// Host load indicator source.
pub trait HostLoadProbe: Send + Sync + 'static {
    /// One-minute load average normalized per CPU, if available.
    fn sample(&self) -> Option<f64>;
}

/// Indicators gathered by one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLoadSnapshot {
    /// When the sample was taken.
    pub taken_at: DateTime<Utc>,
    /// Executions in flight.
    pub running_tasks: usize,
    /// Failure share of outcomes inside the window (0 below `min_samples`).
    pub failure_rate: f64,
    /// Outcomes inside the window.
    pub window_samples: usize,
    /// Normalized host load, when a probe is installed.
    pub host_load: Option<f64>,
    /// Mode derived from this sample.
    pub mode: CoordinationMode,
}

/// Map indicators to a mode.
pub fn assess_mode(failure_rate: f64, running: usize, config: &LoadMonitorConfig) -> CoordinationMode {
    if failure_rate > config.failure_rate_critical || running >= config.hard_cap {
        CoordinationMode::Emergency
    } else if failure_rate > config.failure_rate_warning || running >= config.soft_cap {
        CoordinationMode::HighLoad
    } else {
        CoordinationMode::Normal
    }
}

/// Samples load indicators and publishes the current [`CoordinationMode`].
pub struct LoadMonitor {
    config: LoadMonitorConfig,
    mode: AtomicU8,
    outcomes: Mutex<VecDeque<(DateTime<Utc>, bool)>>,
    probe: Option<Arc<dyn HostLoadProbe>>,
}

impl LoadMonitor {
    /// Create a monitor starting in `Normal` mode.
    pub fn new(config: LoadMonitorConfig) -> Self {
        Self {
            config,
            mode: AtomicU8::new(CoordinationMode::Normal.to_u8()),
            outcomes: Mutex::new(VecDeque::new()),
            probe: None,
        }
    }

    /// Attach a host load probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HostLoadProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Monitor configuration.
    pub const fn config(&self) -> &LoadMonitorConfig {
        &self.config
    }

    /// Current mode. One load per admission decision keeps it consistent.
    pub fn mode(&self) -> CoordinationMode {
        CoordinationMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Override the mode until the next sample.
    pub fn force_mode(&self, mode: CoordinationMode) {
        self.publish(mode);
    }

    /// Record the outcome of a finished execution.
    ///
    /// Outcomes older than the failure window relative to `at` are dropped
    /// here as well as on [`Self::sample`], so the window stays bounded when
    /// nothing samples.
    pub fn record_outcome(&self, at: DateTime<Utc>, failed: bool) {
        let mut outcomes = self.outcomes.lock();
        outcomes.push_back((at, failed));
        self.trim(&mut outcomes, at);
    }

    fn trim(&self, outcomes: &mut VecDeque<(DateTime<Utc>, bool)>, now: DateTime<Utc>) {
        let horizon = now
            .checked_sub_signed(to_chrono(self.config.failure_window()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        while outcomes.front().is_some_and(|(at, _)| *at < horizon) {
            outcomes.pop_front();
        }
    }

    /// Take a sample, recompute the mode, and return the indicators.
    pub fn sample(&self, running_tasks: usize, now: DateTime<Utc>) -> SystemLoadSnapshot {
        let (failures, window_samples) = {
            let mut outcomes = self.outcomes.lock();
            self.trim(&mut outcomes, now);
            (outcomes.iter().filter(|(_, failed)| *failed).count(), outcomes.len())
        };

        #[allow(clippy::cast_precision_loss)]
        let failure_rate = if window_samples < self.config.min_samples || window_samples == 0 {
            0.0
        } else {
            failures as f64 / window_samples as f64
        };

        let mode = assess_mode(failure_rate, running_tasks, &self.config);
        self.publish(mode);

        SystemLoadSnapshot {
            taken_at: now,
            running_tasks,
            failure_rate,
            window_samples,
            host_load: self.probe.as_ref().and_then(|p| p.sample()),
            mode,
        }
    }

    fn publish(&self, mode: CoordinationMode) {
        let previous = CoordinationMode::from_u8(self.mode.swap(mode.to_u8(), Ordering::AcqRel));
        if previous == mode {
            return;
        }
        match mode {
            CoordinationMode::Emergency => {
                warn!(from = ?previous, to = ?mode, "coordination mode changed");
            }
            _ => info!(from = ?previous, to = ?mode, "coordination mode changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> LoadMonitorConfig {
        LoadMonitorConfig {
            min_samples: 4,
            failure_rate_warning: 0.25,
            failure_rate_critical: 0.5,
            soft_cap: 4,
            hard_cap: 8,
            ..LoadMonitorConfig::default()
        }
    }

    #[test]
    fn assess_mode_thresholds() {
        let c = config();
        assert_eq!(assess_mode(0.0, 0, &c), CoordinationMode::Normal);
        assert_eq!(assess_mode(0.25, 3, &c), CoordinationMode::Normal);
        assert_eq!(assess_mode(0.3, 0, &c), CoordinationMode::HighLoad);
        assert_eq!(assess_mode(0.0, 4, &c), CoordinationMode::HighLoad);
        assert_eq!(assess_mode(0.51, 0, &c), CoordinationMode::Emergency);
        assert_eq!(assess_mode(0.0, 8, &c), CoordinationMode::Emergency);
    }

    #[test]
    fn multipliers() {
        assert_eq!(CoordinationMode::Normal.interval_multiplier(), 1);
        assert_eq!(CoordinationMode::HighLoad.interval_multiplier(), 2);
    }

    #[test]
    fn failure_rate_needs_min_samples() {
        let m = LoadMonitor::new(config());
        let now = Utc::now();
        for _ in 0..3 {
            m.record_outcome(now, true);
        }
        let snap = m.sample(0, now);
        assert!((snap.failure_rate - 0.0).abs() < f64::EPSILON);
        assert_eq!(snap.mode, CoordinationMode::Normal);

        m.record_outcome(now, true);
        let snap = m.sample(0, now);
        assert!((snap.failure_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(m.mode(), CoordinationMode::Emergency);
    }

    #[test]
    fn old_outcomes_leave_the_window() {
        let m = LoadMonitor::new(config());
        let start = Utc::now();
        for _ in 0..4 {
            m.record_outcome(start, true);
        }
        assert_eq!(m.sample(0, start).mode, CoordinationMode::Emergency);
        let later = start + to_chrono(m.config().failure_window() + Duration::from_secs(1));
        let snap = m.sample(0, later);
        assert_eq!(snap.window_samples, 0);
        assert_eq!(snap.mode, CoordinationMode::Normal);
    }

    #[test]
    fn recording_drops_outcomes_outside_the_window() {
        let m = LoadMonitor::new(config());
        let start = Utc::now();
        m.record_outcome(start, true);
        m.record_outcome(start, false);
        let later = start + to_chrono(m.config().failure_window() + Duration::from_secs(1));
        m.record_outcome(later, false);
        assert_eq!(m.outcomes.lock().len(), 1);
    }
}
