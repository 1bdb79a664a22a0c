//! Shared identifiers and closed enums used across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Task identifier as it appears in the catalog.
pub type TaskId = String;

/// Scheduling priority. Lower values run first on contention.
pub type Priority = u32;

/// Shared resource categories a task may require while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A remote control-channel session to a monitored host.
    SshConnection,
    /// The metrics/time-series database connection.
    Database,
    /// CPU-heavy local processing.
    CpuIntensive,
    /// Network bandwidth.
    NetworkIo,
    /// Large in-memory working sets.
    MemoryIntensive,
}

impl ResourceKind {
    /// Every resource kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::SshConnection,
        Self::Database,
        Self::CpuIntensive,
        Self::NetworkIo,
        Self::MemoryIntensive,
    ];

    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SshConnection => "ssh_connection",
            Self::Database => "database",
            Self::CpuIntensive => "cpu_intensive",
            Self::NetworkIo => "network_io",
            Self::MemoryIntensive => "memory_intensive",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
