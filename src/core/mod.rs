//! Core scheduling abstractions: data model, store and oracle seams, queues,
//! worker pool and the supervisor control loop.

pub mod archive;
pub mod audit;
pub mod error;
pub mod executor;
pub mod handle;
pub mod job;
pub mod queue;
pub mod schedule;
pub mod store;
pub mod supervisor;
pub mod task;
pub mod update;
pub mod worker_pool;

pub use archive::{Archive, ArchiveStatus, Target};
pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{AppResult, PipelineError, ScheduleError, SchedulerError, StoreError};
pub use executor::{PipelineOutput, PluginExecutor};
pub use handle::{AdhocOp, AdhocReply, AdhocRequest, SupervisorHandle, SupervisorStatus, TaskBrief};
pub use job::{Job, Retention};
pub use queue::{QueuedTask, RunQueue, RunningTask, ScheduleQueue};
pub use schedule::ScheduleOracle;
pub use store::{Store, StoreResult};
pub use supervisor::{RecoveryReport, Supervisor};
pub use task::{Operation, PluginConfig, Task, TaskFilter, TaskStatus, SYSTEM_OWNER};
pub use update::{OutputSink, UpdateReceiver, UpdateSender, WorkerUpdate};
pub use worker_pool::{DispatchedTask, PoolError, PoolStats, WorkerPool};
