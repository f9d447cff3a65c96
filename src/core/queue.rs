//! Schedule queue and run queue owned by the supervisor.
//!
//! Both queues are plain in-memory structures mutated only from the
//! supervisor loop, so they carry no locks. Neither ever holds the same task
//! twice.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::core::{Operation, Task};

/// A created task waiting for a worker, with the deadline it must finish by.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    /// The task as it was created in the store.
    pub task: Task,
    /// Absolute deadline.
    pub deadline: DateTime<Utc>,
}

/// Tasks created but not yet dispatched, in insertion order.
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    entries: VecDeque<QueuedTask>,
}

impl ScheduleQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task with its deadline.
    ///
    /// Returns `false` (and leaves the queue untouched) if the task is already queued.
    pub fn push(&mut self, mut task: Task, deadline: DateTime<Utc>) -> bool {
        if self.contains(task.uuid) {
            return false;
        }
        task.timeout_at = Some(deadline);
        self.entries.push_back(QueuedTask { task, deadline });
        true
    }

    /// Whether the task is queued.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|e| e.task.uuid == id)
    }

    /// Entry at `index`, in queue order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&QueuedTask> {
        self.entries.get(index)
    }

    /// Remove the entry at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<QueuedTask> {
        self.entries.remove(index)
    }

    /// Remove every entry whose deadline is before `now`, preserving the order of the rest.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<QueuedTask> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.deadline < now);
        self.entries = kept.into();
        expired
    }

    /// Whether a purge of `archive` is already waiting.
    #[must_use]
    pub fn has_purge_for(&self, archive: Uuid) -> bool {
        self.entries
            .iter()
            .any(|e| e.task.op == Operation::Purge && e.task.archive_uuid == Some(archive))
    }

    /// Iterate in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedTask> {
        self.entries.iter()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A task held by a worker.
#[derive(Debug)]
pub struct RunningTask {
    /// The dispatched task.
    pub task: Task,
    /// Absolute deadline carried over from the schedule queue.
    pub deadline: DateTime<Utc>,
    /// When it was handed to a worker.
    pub dispatched_at: DateTime<Utc>,
    /// Fires the worker-side cancellation.
    pub cancel: watch::Sender<bool>,
}

impl RunningTask {
    /// Ask the worker to abandon the task.
    pub fn cancel(&self) {
        // the worker may already be gone; nothing to do then
        let _ = self.cancel.send(true);
    }
}

/// Tasks currently dispatched to workers, tracked for timeout enforcement.
#[derive(Debug, Default)]
pub struct RunQueue {
    entries: Vec<RunningTask>,
}

impl RunQueue {
    /// Create an empty run queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a dispatched task. Returns `false` if it is already tracked.
    pub fn insert(&mut self, running: RunningTask) -> bool {
        if self.contains(running.task.uuid) {
            return false;
        }
        self.entries.push(running);
        true
    }

    /// Stop tracking a task. Removing an unknown task is a no-op.
    pub fn remove(&mut self, id: Uuid) -> Option<RunningTask> {
        let pos = self.entries.iter().position(|r| r.task.uuid == id)?;
        Some(self.entries.remove(pos))
    }

    /// Whether the task is tracked.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|r| r.task.uuid == id)
    }

    /// Look up a tracked task.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&RunningTask> {
        self.entries.iter().find(|r| r.task.uuid == id)
    }

    /// Remove and return every task whose deadline is before `now`.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<RunningTask> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|r| r.deadline < now);
        self.entries = kept;
        expired
    }

    /// Whether a purge of `archive` is running.
    #[must_use]
    pub fn has_purge_for(&self, archive: Uuid) -> bool {
        self.entries
            .iter()
            .any(|r| r.task.op == Operation::Purge && r.task.archive_uuid == Some(archive))
    }

    /// Iterate in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &RunningTask> {
        self.entries.iter()
    }

    /// Number of running tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Archive, ArchiveStatus, PluginConfig, SYSTEM_OWNER};
    use chrono::Duration;

    fn archive() -> Archive {
        let now = Utc::now();
        Archive {
            uuid: Uuid::new_v4(),
            job_uuid: None,
            target_uuid: None,
            store: PluginConfig::new("s3", serde_json::json!({})),
            store_key: "abc123".into(),
            taken_at: now,
            expires_at: now,
            status: ArchiveStatus::Expired,
            purge_reason: None,
            purged_at: None,
        }
    }

    fn purge_task(archive: &Archive) -> Task {
        Task::purge(SYSTEM_OWNER, archive, "purge-agent:5444", Utc::now())
    }

    fn running(task: Task, deadline: DateTime<Utc>) -> RunningTask {
        RunningTask {
            task,
            deadline,
            dispatched_at: Utc::now(),
            cancel: watch::channel(false).0,
        }
    }

    #[test]
    fn schedule_queue_is_fifo_and_deduplicated() {
        let now = Utc::now();
        let mut q = ScheduleQueue::new();
        let a = purge_task(&archive());
        let b = purge_task(&archive());

        assert!(q.push(a.clone(), now));
        assert!(q.push(b.clone(), now));
        assert!(!q.push(a.clone(), now));
        assert_eq!(q.len(), 2);

        assert_eq!(q.get(0).unwrap().task.uuid, a.uuid);
        assert_eq!(q.get(1).unwrap().task.uuid, b.uuid);
        assert_eq!(q.get(0).unwrap().task.timeout_at, Some(now));

        assert_eq!(q.remove_at(0).unwrap().task.uuid, a.uuid);
        assert_eq!(q.get(0).unwrap().task.uuid, b.uuid);
    }

    #[test]
    fn schedule_queue_takes_expired_in_order() {
        let now = Utc::now();
        let mut q = ScheduleQueue::new();
        let early = purge_task(&archive());
        let late = purge_task(&archive());
        let earlier = purge_task(&archive());
        q.push(early.clone(), now - Duration::seconds(5));
        q.push(late.clone(), now + Duration::seconds(5));
        q.push(earlier.clone(), now - Duration::seconds(10));

        let expired = q.take_expired(now);
        let ids: Vec<_> = expired.iter().map(|e| e.task.uuid).collect();
        assert_eq!(ids, vec![early.uuid, earlier.uuid]);
        assert_eq!(q.len(), 1);
        assert!(q.contains(late.uuid));
    }

    #[test]
    fn purge_lookup_by_archive() {
        let a = archive();
        let mut q = ScheduleQueue::new();
        assert!(!q.has_purge_for(a.uuid));
        q.push(purge_task(&a), Utc::now());
        assert!(q.has_purge_for(a.uuid));
        assert!(!q.has_purge_for(Uuid::new_v4()));
    }

    #[test]
    fn run_queue_never_holds_duplicates() {
        let now = Utc::now();
        let task = purge_task(&archive());
        let mut rq = RunQueue::new();
        assert!(rq.insert(running(task.clone(), now)));
        assert!(!rq.insert(running(task.clone(), now)));
        assert_eq!(rq.len(), 1);
    }

    #[test]
    fn run_queue_remove_is_idempotent() {
        let task = purge_task(&archive());
        let mut rq = RunQueue::new();
        rq.insert(running(task.clone(), Utc::now()));
        assert!(rq.remove(task.uuid).is_some());
        assert!(rq.remove(task.uuid).is_none());
        assert!(rq.is_empty());
    }

    #[test]
    fn run_queue_expiry_fires_nothing_for_live_tasks() {
        let now = Utc::now();
        let overdue = purge_task(&archive());
        let live = purge_task(&archive());
        let mut rq = RunQueue::new();
        rq.insert(running(overdue.clone(), now - Duration::seconds(1)));
        rq.insert(running(live.clone(), now + Duration::seconds(60)));

        let expired = rq.take_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].task.uuid, overdue.uuid);
        assert!(rq.contains(live.uuid));
        assert!(!rq.contains(overdue.uuid));
    }

    #[test]
    fn cancel_signal_reaches_receiver() {
        let (tx, rx) = watch::channel(false);
        let r = RunningTask {
            task: purge_task(&archive()),
            deadline: Utc::now(),
            dispatched_at: Utc::now(),
            cancel: tx,
        };
        r.cancel();
        assert!(*rx.borrow());
    }
}
