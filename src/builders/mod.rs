//! Builders to construct the supervisor from configuration.

pub mod supervisor_builder;

pub use supervisor_builder::{SupervisorBuilder, ADHOC_BUFFER};
