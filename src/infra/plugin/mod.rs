//! Plugin executors.

pub mod command;

pub use command::CommandPipeline;
