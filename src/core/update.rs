//! Worker-to-supervisor lifecycle updates.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A lifecycle event a worker reports for the task it holds.
///
/// Each dispatched task produces any number of non-terminal updates followed
/// by exactly one `Stopped` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerUpdate {
    /// One line of pipeline output for the live log.
    Output {
        /// Task the line belongs to.
        task: Uuid,
        /// The line, without its trailing newline.
        line: String,
    },
    /// A backup produced an archive locator.
    RestoreKey {
        /// Backup task.
        task: Uuid,
        /// Content-addressed locator returned by the store plugin.
        key: String,
        /// When the key was produced.
        at: DateTime<Utc>,
        /// Whether the pipeline that produced the key exited cleanly.
        ok: bool,
    },
    /// A purge task removed its archive from the store.
    PurgeArchive {
        /// Purge task.
        task: Uuid,
        /// Archive that was removed.
        archive: Uuid,
    },
    /// The task finished successfully. Terminal.
    Stopped {
        /// Task that finished.
        task: Uuid,
        /// Stop timestamp.
        at: DateTime<Utc>,
    },
    /// The task finished unsuccessfully. Terminal.
    Failed {
        /// Task that failed.
        task: Uuid,
        /// Stop timestamp.
        at: DateTime<Utc>,
    },
}

impl WorkerUpdate {
    /// Task the update refers to.
    #[must_use]
    pub const fn task(&self) -> Uuid {
        match self {
            Self::Output { task, .. }
            | Self::RestoreKey { task, .. }
            | Self::PurgeArchive { task, .. }
            | Self::Stopped { task, .. }
            | Self::Failed { task, .. } => *task,
        }
    }

    /// Whether this update ends the task.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Failed { .. })
    }
}

/// Sending half of the update channel, shared by every worker.
pub type UpdateSender = mpsc::UnboundedSender<WorkerUpdate>;

/// Receiving half of the update channel, owned by the supervisor.
pub type UpdateReceiver = mpsc::UnboundedReceiver<WorkerUpdate>;

/// Per-task output relay handed to a plugin executor.
#[derive(Debug, Clone)]
pub struct OutputSink {
    task: Uuid,
    tx: UpdateSender,
}

impl OutputSink {
    /// Relay output for `task` over `tx`.
    #[must_use]
    pub const fn new(task: Uuid, tx: UpdateSender) -> Self {
        Self { task, tx }
    }

    /// Task this sink reports for.
    #[must_use]
    pub const fn task(&self) -> Uuid {
        self.task
    }

    /// Send one line as an `Output` update.
    pub fn line(&self, line: impl Into<String>) {
        let _ = self.tx.send(WorkerUpdate::Output {
            task: self.task,
            line: line.into(),
        });
    }

    pub(crate) fn send(&self, update: WorkerUpdate) {
        // supervisor gone means we are shutting down
        let _ = self.tx.send(update);
    }
}
