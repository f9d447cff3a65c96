//! # Backup Supervisor
//!
//! The scheduling core of a backup-job orchestrator: it turns recurring job
//! definitions into backup tasks, dispatches backup, restore and purge tasks
//! to a bounded pool of workers, enforces per-task deadlines, recovers work
//! left behind by a previous process and drives archives through
//! `valid -> expired -> purged`.
//!
//! ## Moving parts
//!
//! - **[`core::Supervisor`]**: a single control loop owning the job queue,
//!   schedule queue and run queue. It is the only writer of task and archive
//!   transitions to the durable store.
//! - **[`core::WorkerPool`]**: `W` OS threads, each with its own
//!   single-threaded tokio runtime, running one plugin pipeline at a time and
//!   reporting [`core::WorkerUpdate`]s back to the supervisor.
//! - **[`core::Store`]** and **[`core::ScheduleOracle`]**: the seams to
//!   durable storage and to recurrence parsing.
//! - **[`core::SupervisorHandle`]**: what an API layer holds to trigger a
//!   resync, submit adhoc work, read status and shut down.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use backup_supervisor::builders::SupervisorBuilder;
//! use backup_supervisor::config::SupervisorConfig;
//! use backup_supervisor::infra::{CommandPipeline, InMemoryStore};
//!
//! backup_supervisor::util::init_tracing();
//! let (supervisor, handle) = SupervisorBuilder::new(SupervisorConfig::from_env()?)
//!     .with_store(Arc::new(InMemoryStore::new()))
//!     .with_oracle(Arc::new(my_oracle))
//!     .with_executor(CommandPipeline::new("/usr/libexec/backup-pipe"))
//!     .build()?;
//! let loop_task = tokio::spawn(supervisor.run());
//!
//! let task = handle.submit_restore("alice", archive_id, None).await?;
//! handle.shutdown();
//! loop_task.await??;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and the supervisor control loop.
pub mod core;
/// Configuration model.
pub mod config;
/// Builders to construct the supervisor from configuration.
pub mod builders;
/// Infrastructure adapters for storage and plugin execution.
pub mod infra;
/// API surface for the HTTP layer.
pub mod runtime;
/// Shared utilities.
pub mod util;
