//! Result mailboxes: [`ResultSink`](crate::core::ResultSink) backends that
//! keep or fan out finished execution results.

pub mod broadcast;
pub mod memory;

pub use broadcast::BroadcastMailbox;
pub use memory::InMemoryMailbox;
