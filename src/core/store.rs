//! Durable store abstraction consumed by the supervisor.
//!
//! The supervisor is the only writer of task and archive state transitions;
//! the API layer writes job, target and store definitions and signals a resync.
//! Implementations must refuse to move a task out of a terminal status and
//! must refuse to purge a `valid` archive.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::{Archive, Job, StoreError, Target, Task, TaskFilter};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable records for jobs, tasks, archives and targets.
pub trait Store: Send + Sync {
    /// Every job definition, with its schedule and retention.
    fn get_all_jobs(&self) -> StoreResult<Vec<Job>>;
    /// One job.
    fn get_job(&self, id: Uuid) -> StoreResult<Job>;
    /// Tasks matching `filter`, oldest request first.
    fn get_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;
    /// One task.
    fn get_task(&self, id: Uuid) -> StoreResult<Task>;
    /// One archive.
    fn get_archive(&self, id: Uuid) -> StoreResult<Archive>;
    /// One target.
    fn get_target(&self, id: Uuid) -> StoreResult<Target>;

    /// Record a pending backup of `job`.
    fn create_backup_task(&self, owner: &str, job: &Job) -> StoreResult<Task>;
    /// Record a pending restore of `archive` into `target`.
    fn create_restore_task(&self, owner: &str, archive: &Archive, target: &Target) -> StoreResult<Task>;
    /// Record a pending purge of `archive` through `agent`.
    fn create_purge_task(&self, owner: &str, archive: &Archive, agent: &str) -> StoreResult<Task>;

    /// Whether `task` may start now (no conflicting task running on its target).
    fn is_task_runnable(&self, task: &Task) -> StoreResult<bool>;
    /// Mark the task `Running` and count the attempt.
    fn start_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// Mark the task `Done`.
    fn complete_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// Mark the task `Failed`.
    fn fail_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// Mark the task `Canceled`.
    fn cancel_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// Append output to the task log.
    fn append_task_log(&self, id: Uuid, line: &str) -> StoreResult<()>;

    /// Create the archive produced by backup task `id` and link it to the task.
    fn create_task_archive(&self, id: Uuid, key: &str, at: DateTime<Utc>) -> StoreResult<Archive>;
    /// Mark an archive `invalid`.
    fn invalidate_archive(&self, id: Uuid) -> StoreResult<()>;
    /// Mark an archive `expired`.
    fn expire_archive(&self, id: Uuid) -> StoreResult<()>;
    /// Mark an archive `purged`, remembering why.
    fn purge_archive(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// Valid archives whose retention has run out as of `now`.
    fn get_expired_archives(&self, now: DateTime<Utc>) -> StoreResult<Vec<Archive>>;
    /// Archives that are neither valid nor purged.
    fn get_archives_needing_purge(&self) -> StoreResult<Vec<Archive>>;
}
