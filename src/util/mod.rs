//! Shared utilities: clock, identifiers, telemetry.

pub mod clock;
pub mod serde;
pub mod telemetry;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::serde::{Priority, ResourceKind, TaskId};
pub use self::telemetry::init_tracing;
