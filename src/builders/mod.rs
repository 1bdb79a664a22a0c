//! Builders that assemble an engine from configuration and a task catalog.

pub mod catalog;
pub mod engine_builder;

pub use catalog::fleet_catalog;
pub use engine_builder::EngineBuilder;
