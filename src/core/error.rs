//! Error types for supervisor operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the durable store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A record could not be found.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind (task, job, archive, target).
        kind: &'static str,
        /// Identifier that was looked up.
        id: Uuid,
    },
    /// The task is already in a terminal state and cannot move again.
    #[error("task {id} is already {status}; refusing transition to {requested}")]
    TerminalState {
        /// Task identifier.
        id: Uuid,
        /// Current (terminal) status.
        status: String,
        /// Requested status.
        requested: String,
    },
    /// A `purged` archive is terminal.
    #[error("archive {0} is already purged")]
    ArchivePurged(Uuid),
    /// A `valid` archive cannot be purged.
    #[error("refusing to purge valid archive {0}")]
    PurgeValidArchive(Uuid),
    /// An archive needs a non-empty restore key.
    #[error("cannot create an archive without a restore key (task {0})")]
    MissingRestoreKey(Uuid),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors produced by the schedule oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The recurrence spec could not be understood.
    #[error("malformed schedule `{spec}`: {reason}")]
    Malformed {
        /// The offending spec.
        spec: String,
        /// Parser message.
        reason: String,
    },
    /// The oracle answered with an instant that is not after the reference.
    #[error("schedule `{0}` produced no future run")]
    NotInFuture(String),
}

/// Errors surfaced by the supervisor to its callers.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// Durable store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Schedule computation failure.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),
    /// No job with that identifier is loaded.
    #[error("job {0} is not known to the supervisor")]
    UnknownJob(Uuid),
    /// The adhoc request refers to records that cannot serve it.
    #[error("adhoc request rejected: {0}")]
    Rejected(String),
    /// The supervisor loop is not accepting requests.
    #[error("supervisor unavailable")]
    Unavailable,
    /// The supervisor dropped the reply channel or the caller gave up waiting.
    #[error("no reply from supervisor")]
    NoReply,
}

/// Errors produced by a plugin pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline could not be started or its streams failed.
    #[error("pipeline i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The task carries no agent/plugin to run against.
    #[error("no remote agent specified for task {0}")]
    NoAgent(Uuid),
    /// The task was canceled by the supervisor before completion.
    #[error("canceled")]
    Canceled,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
