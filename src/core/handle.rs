//! Cloneable handle the API layer uses to drive a running supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use crate::core::{Operation, PoolStats, SchedulerError, TaskStatus};

/// Reply to an adhoc request: the new task's identifier or why none was created.
pub type AdhocReply = Result<Uuid, SchedulerError>;

/// Immediate work requested from outside the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdhocOp {
    /// Run a job's backup now.
    Backup {
        /// Job to run.
        job: Uuid,
    },
    /// Restore an archive.
    Restore {
        /// Archive to restore.
        archive: Uuid,
        /// Destination; defaults to the target the archive was taken from.
        #[serde(default)]
        target: Option<Uuid>,
    },
    /// Purge an archive that is no longer valid.
    Purge {
        /// Archive to purge.
        archive: Uuid,
    },
}

impl AdhocOp {
    /// Operation the resulting task performs.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Backup { .. } => Operation::Backup,
            Self::Restore { .. } => Operation::Restore,
            Self::Purge { .. } => Operation::Purge,
        }
    }
}

/// An adhoc request with an optional reply path.
#[derive(Debug)]
pub struct AdhocRequest {
    /// Requesting actor.
    pub owner: String,
    /// What to do.
    pub op: AdhocOp,
    /// Receives exactly one reply when present.
    pub reply: Option<oneshot::Sender<AdhocReply>>,
}

/// One queued or running task as seen by status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBrief {
    /// Task identifier.
    pub uuid: Uuid,
    /// Operation.
    pub op: Operation,
    /// Requesting actor.
    pub owner: String,
    /// Status as last known in memory.
    pub status: TaskStatus,
    /// Deadline.
    pub deadline: DateTime<Utc>,
    /// Milliseconds left before the deadline sweep cancels it.
    pub remaining_ms: u64,
}

/// Backlog and worker status published after every loop iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    /// Jobs in the job queue.
    pub jobs: usize,
    /// Schedule queue, in dispatch order.
    pub scheduled: Vec<TaskBrief>,
    /// Run queue, in dispatch order.
    pub running: Vec<TaskBrief>,
    /// Worker pool utilization.
    pub pool: PoolStats,
    /// When this snapshot was taken; `None` before the loop started.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Channels and shared state connecting a [`SupervisorHandle`] to its supervisor.
pub(crate) struct HandleParts {
    pub resync_tx: mpsc::Sender<()>,
    pub adhoc_tx: mpsc::Sender<AdhocRequest>,
    pub shutdown_tx: watch::Sender<bool>,
    pub status: Arc<RwLock<SupervisorStatus>>,
    pub reply_timeout: Duration,
}

/// API-facing handle: resync trigger, adhoc submission, status and shutdown.
#[derive(Clone)]
pub struct SupervisorHandle {
    resync_tx: mpsc::Sender<()>,
    adhoc_tx: mpsc::Sender<AdhocRequest>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    status: Arc<RwLock<SupervisorStatus>>,
    reply_timeout: Duration,
}

impl SupervisorHandle {
    pub(crate) fn new(parts: HandleParts) -> Self {
        Self {
            resync_tx: parts.resync_tx,
            adhoc_tx: parts.adhoc_tx,
            shutdown_tx: Arc::new(parts.shutdown_tx),
            status: parts.status,
            reply_timeout: parts.reply_timeout,
        }
    }

    /// Ask the supervisor to reload its job queue.
    ///
    /// Requests made while one is already pending coalesce into it.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Unavailable` once the supervisor has stopped.
    pub fn resync(&self) -> Result<(), SchedulerError> {
        match self.resync_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SchedulerError::Unavailable),
        }
    }

    /// Submit adhoc work and wait, bounded by the reply timeout, for the new task's id.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's error reply, `Unavailable` if it has stopped,
    /// or `NoReply` if no answer arrived in time.
    pub async fn submit(&self, owner: impl Into<String>, op: AdhocOp) -> AdhocReply {
        let (tx, rx) = oneshot::channel();
        let request = AdhocRequest {
            owner: owner.into(),
            op,
            reply: Some(tx),
        };
        self.adhoc_tx
            .send(request)
            .await
            .map_err(|_| SchedulerError::Unavailable)?;

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) | Err(_) => Err(SchedulerError::NoReply),
        }
    }

    /// Submit adhoc work without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Unavailable` once the supervisor has stopped.
    pub async fn enqueue(&self, owner: impl Into<String>, op: AdhocOp) -> Result<(), SchedulerError> {
        self.adhoc_tx
            .send(AdhocRequest {
                owner: owner.into(),
                op,
                reply: None,
            })
            .await
            .map_err(|_| SchedulerError::Unavailable)
    }

    /// Run a job's backup now.
    ///
    /// # Errors
    ///
    /// See [`SupervisorHandle::submit`].
    pub async fn submit_backup(&self, owner: impl Into<String>, job: Uuid) -> AdhocReply {
        self.submit(owner, AdhocOp::Backup { job }).await
    }

    /// Restore `archive` into `target`, or into its original target when `None`.
    ///
    /// # Errors
    ///
    /// See [`SupervisorHandle::submit`].
    pub async fn submit_restore(&self, owner: impl Into<String>, archive: Uuid, target: Option<Uuid>) -> AdhocReply {
        self.submit(owner, AdhocOp::Restore { archive, target }).await
    }

    /// Purge `archive`.
    ///
    /// # Errors
    ///
    /// See [`SupervisorHandle::submit`].
    pub async fn submit_purge(&self, owner: impl Into<String>, archive: Uuid) -> AdhocReply {
        self.submit(owner, AdhocOp::Purge { archive }).await
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> SupervisorStatus {
        self.status.read().clone()
    }

    /// Stop the control loop; the worker pool shuts down when it exits.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the supervisor is still accepting requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.adhoc_tx.is_closed()
    }
}
