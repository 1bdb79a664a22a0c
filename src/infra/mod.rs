//! Infrastructure adapters for result delivery, host load and collection.

pub mod collection;
pub mod host;
pub mod mailbox;

pub use collection::InMemoryCollector;
pub use host::{FixedHostLoad, ProcLoadAvg};
pub use mailbox::{BroadcastMailbox, InMemoryMailbox};
