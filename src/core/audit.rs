//! Audit trail of task and archive lifecycle transitions.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::clock::now;

/// Lifecycle transition being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Task created and placed in the schedule queue.
    TaskScheduled,
    /// Task handed to a worker.
    TaskDispatched,
    /// Worker reported success.
    TaskCompleted,
    /// Worker reported failure, or the task was found running at startup.
    TaskFailed,
    /// Task deadline elapsed.
    TaskTimedOut,
    /// Archive record created from a restore key.
    ArchiveCreated,
    /// Archive marked invalid.
    ArchiveInvalidated,
    /// Archive retention ran out.
    ArchiveExpired,
    /// Archive removed from its store.
    ArchivePurged,
}

impl AuditAction {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskScheduled => "task_scheduled",
            Self::TaskDispatched => "task_dispatched",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskTimedOut => "task_timed_out",
            Self::ArchiveCreated => "archive_created",
            Self::ArchiveInvalidated => "archive_invalidated",
            Self::ArchiveExpired => "archive_expired",
            Self::ArchivePurged => "archive_purged",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Transition recorded.
    pub action: AuditAction,
    /// Related task.
    pub task_id: Option<Uuid>,
    /// Related archive.
    pub archive_id: Option<Uuid>,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
    /// Additional context.
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Event about a task.
    #[must_use]
    pub fn task(action: AuditAction, task: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            action,
            task_id: Some(task),
            archive_id: None,
            created_at: now(),
            detail: None,
        }
    }

    /// Event about an archive.
    #[must_use]
    pub fn archive(action: AuditAction, archive: Uuid) -> Self {
        Self {
            archive_id: Some(archive),
            task_id: None,
            ..Self::task(action, archive)
        }
    }

    /// Attach free-form context.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// Bounded in-memory audit sink for tests and development.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a sink keeping at most `max_events`, dropping the oldest first.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events with the given action.
    #[must_use]
    pub fn with_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}
