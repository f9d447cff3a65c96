//! Infrastructure adapters: durable store backends and plugin executors.

pub mod plugin;
pub mod store;

pub use plugin::CommandPipeline;
pub use store::InMemoryStore;
