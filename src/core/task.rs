//! Task model: one attempt at a backup, restore or purge operation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Archive, Job, Target};

/// Owner recorded on tasks the supervisor creates on its own.
pub const SYSTEM_OWNER: &str = "system";

/// Operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Stream a target into a store, producing an archive.
    Backup,
    /// Stream an archive from a store back into a target.
    Restore,
    /// Remove an archive from its store.
    Purge,
}

impl Operation {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Purge => "purge",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a task in its lifecycle.
///
/// `Done`, `Failed` and `Canceled` are terminal: nothing moves a task out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting in the schedule queue.
    Pending,
    /// Handed to a worker.
    Running,
    /// Finished successfully.
    Done,
    /// Finished unsuccessfully, timed out at the worker, or found running after a restart.
    Failed,
    /// Canceled explicitly or by the deadline sweep.
    Canceled,
}

impl TaskStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin name plus its free-form endpoint configuration.
///
/// The endpoint is handed opaquely to the plugin pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin identifier.
    pub plugin: String,
    /// Endpoint configuration understood only by the plugin.
    pub endpoint: serde_json::Value,
}

impl PluginConfig {
    /// Create a plugin config.
    pub fn new(plugin: impl Into<String>, endpoint: serde_json::Value) -> Self {
        Self {
            plugin: plugin.into(),
            endpoint,
        }
    }
}

/// One attempt to run an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub uuid: Uuid,
    /// Operation kind.
    pub op: Operation,
    /// `system` or the requesting user.
    pub owner: String,
    /// Job that produced this task, for backups.
    pub job_uuid: Option<Uuid>,
    /// Archive produced (backup) or consumed (restore, purge).
    pub archive_uuid: Option<Uuid>,
    /// Target the task touches; tasks without one never conflict.
    pub target_uuid: Option<Uuid>,
    /// Data source (backup) or destination (restore).
    pub target: Option<PluginConfig>,
    /// Store the archive lives in.
    pub store: Option<PluginConfig>,
    /// Archive locator for restore and purge.
    pub restore_key: Option<String>,
    /// Agent address the pipeline runs against.
    pub agent: String,
    /// Current status.
    pub status: TaskStatus,
    /// When the task was requested.
    pub requested_at: DateTime<Utc>,
    /// When a worker picked it up.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Accumulated pipeline output.
    pub log: String,
    /// How many times it was dispatched.
    pub attempts: u32,
    /// Deadline assigned when it entered the schedule queue.
    pub timeout_at: Option<DateTime<Utc>>,
}

impl Task {
    fn pending(op: Operation, owner: &str, agent: &str, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            op,
            owner: owner.to_string(),
            job_uuid: None,
            archive_uuid: None,
            target_uuid: None,
            target: None,
            store: None,
            restore_key: None,
            agent: agent.to_string(),
            status: TaskStatus::Pending,
            requested_at: now,
            started_at: None,
            stopped_at: None,
            log: String::new(),
            attempts: 0,
            timeout_at: None,
        }
    }

    /// New pending backup of `job`.
    #[must_use]
    pub fn backup(owner: &str, job: &Job, now: DateTime<Utc>) -> Self {
        let mut task = Self::pending(Operation::Backup, owner, &job.agent, now);
        task.job_uuid = Some(job.uuid);
        task.target_uuid = Some(job.target_uuid);
        task.target = Some(job.target.clone());
        task.store = Some(job.store.clone());
        task
    }

    /// New pending restore of `archive` into `target`.
    #[must_use]
    pub fn restore(owner: &str, archive: &Archive, target: &Target, now: DateTime<Utc>) -> Self {
        let mut task = Self::pending(Operation::Restore, owner, &target.agent, now);
        task.job_uuid = archive.job_uuid;
        task.archive_uuid = Some(archive.uuid);
        task.target_uuid = Some(target.uuid);
        task.target = Some(target.config.clone());
        task.store = Some(archive.store.clone());
        task.restore_key = Some(archive.store_key.clone());
        task
    }

    /// New pending purge of `archive`, run through `agent`.
    #[must_use]
    pub fn purge(owner: &str, archive: &Archive, agent: &str, now: DateTime<Utc>) -> Self {
        let mut task = Self::pending(Operation::Purge, owner, agent, now);
        task.job_uuid = archive.job_uuid;
        task.archive_uuid = Some(archive.uuid);
        task.store = Some(archive.store.clone());
        task.restore_key = Some(archive.store_key.clone());
        task
    }
}

/// Filter for task queries against the store.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks in this status.
    pub status: Option<TaskStatus>,
    /// Only tasks of this operation.
    pub op: Option<Operation>,
    /// Only tasks against this archive.
    pub archive: Option<Uuid>,
}

impl TaskFilter {
    /// Filter on status.
    #[must_use]
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether `task` passes the filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.op.map_or(true, |op| task.op == op)
            && self.archive.map_or(true, |a| task.archive_uuid == Some(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
    }

    #[test]
    fn filter_matches_on_every_field() {
        let archive = Uuid::new_v4();
        let mut task = Task::pending(Operation::Purge, SYSTEM_OWNER, "agent:5444", Utc::now());
        task.archive_uuid = Some(archive);

        assert!(TaskFilter::default().matches(&task));
        assert!(TaskFilter::with_status(TaskStatus::Pending).matches(&task));
        assert!(!TaskFilter::with_status(TaskStatus::Running).matches(&task));

        let filter = TaskFilter {
            op: Some(Operation::Purge),
            archive: Some(archive),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&task));

        let other = TaskFilter {
            archive: Some(Uuid::new_v4()),
            ..TaskFilter::default()
        };
        assert!(!other.matches(&task));
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Operation::Backup).unwrap(), "\"backup\"");
        assert_eq!(serde_json::to_string(&TaskStatus::Canceled).unwrap(), "\"canceled\"");
    }
}
