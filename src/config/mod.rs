//! Configuration model for the supervisor and its worker pool.

pub mod supervisor;

pub use supervisor::{SupervisorConfig, ENV_PREFIX, MAX_TIMEOUT_LIMIT_SECS};
