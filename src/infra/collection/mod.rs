//! Collection-layer adapters.

pub mod memory;

pub use memory::InMemoryCollector;
