//! Load-average probes for [`HostLoadProbe`].

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::HostLoadProbe;

/// Reads the one-minute load average from `/proc/loadavg`, divided by the
/// CPU count.
#[derive(Debug, Clone)]
pub struct ProcLoadAvg {
    path: PathBuf,
    cpus: usize,
}

impl Default for ProcLoadAvg {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcLoadAvg {
    /// Probe reading `/proc/loadavg`.
    pub fn new() -> Self {
        Self::with_path("/proc/loadavg")
    }

    /// Probe reading a loadavg-formatted file at `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cpus: num_cpus::get().max(1),
        }
    }
}

/// Normalized one-minute load from a loadavg line.
#[allow(clippy::cast_precision_loss)]
pub fn parse_loadavg(line: &str, cpus: usize) -> Option<f64> {
    let one_minute: f64 = line.split_whitespace().next()?.parse().ok()?;
    Some(one_minute / cpus.max(1) as f64)
}

impl HostLoadProbe for ProcLoadAvg {
    fn sample(&self) -> Option<f64> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => parse_loadavg(&raw, self.cpus),
            Err(e) => {
                trace!(path = %self.path.display(), error = %e, "load average unavailable");
                None
            }
        }
    }
}

/// Probe returning a settable value.
#[derive(Debug, Default)]
pub struct FixedHostLoad {
    value: Mutex<Option<f64>>,
}

impl FixedHostLoad {
    /// Probe reporting `value`.
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }

    /// Change the reported value.
    pub fn set(&self, value: Option<f64>) {
        *self.value.lock() = value;
    }
}

impl HostLoadProbe for FixedHostLoad {
    fn sample(&self) -> Option<f64> {
        *self.value.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_field_per_cpu() {
        let load = parse_loadavg("3.00 1.50 0.75 2/345 6789\n", 4).unwrap();
        assert!((load - 0.75).abs() < f64::EPSILON);
        assert!(parse_loadavg("", 4).is_none());
        assert!(parse_loadavg("busy", 4).is_none());
    }

    #[test]
    fn missing_file_yields_none() {
        let probe = ProcLoadAvg::with_path("/nonexistent/loadavg");
        assert!(probe.sample().is_none());
    }
}
