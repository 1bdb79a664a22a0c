//! Host load probes.

pub mod loadavg;

pub use loadavg::{FixedHostLoad, ProcLoadAvg};
