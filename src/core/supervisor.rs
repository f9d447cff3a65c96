//! The supervisor control loop.
//!
//! A single task owns the job queue, schedule queue and run queue and is the
//! only writer of task and archive transitions in the store. Every event
//! source (resync, adhoc submissions, worker updates, the fast tick and the
//! purge tick) is served from one `select!`, one event per iteration, so the
//! queues need no locks.
//!
//! Each step of the loop is also a public method taking the current instant,
//! which lets callers drive the supervisor deterministically.

mod purge;
mod recovery;

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::core::{
    AdhocOp, AdhocRequest, AppResult, ArchiveStatus, AuditAction, AuditEvent, AuditSink, Job,
    Operation, PoolError, PoolStats, QueuedTask, RunQueue, RunningTask, ScheduleOracle,
    ScheduleQueue, SchedulerError, Store, StoreError, SupervisorStatus, Task, TaskBrief,
    TaskStatus, UpdateReceiver, WorkerPool, WorkerUpdate, SYSTEM_OWNER,
};
use crate::util::clock;

pub use recovery::RecoveryReport;

/// Everything a supervisor is assembled from.
pub(crate) struct SupervisorParts {
    pub config: SupervisorConfig,
    pub store: Arc<dyn Store>,
    pub oracle: Arc<dyn ScheduleOracle>,
    pub pool: WorkerPool,
    pub audit: Option<Arc<dyn AuditSink>>,
    pub updates_rx: UpdateReceiver,
    pub resync_rx: mpsc::Receiver<()>,
    pub adhoc_rx: mpsc::Receiver<AdhocRequest>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub status: Arc<RwLock<SupervisorStatus>>,
}

/// Scheduling supervisor. Build one with [`crate::builders::SupervisorBuilder`].
pub struct Supervisor {
    config: SupervisorConfig,
    store: Arc<dyn Store>,
    oracle: Arc<dyn ScheduleOracle>,
    pool: WorkerPool,
    audit: Option<Arc<dyn AuditSink>>,

    jobq: Vec<Job>,
    schedq: ScheduleQueue,
    runq: RunQueue,

    updates_rx: UpdateReceiver,
    resync_rx: mpsc::Receiver<()>,
    adhoc_rx: mpsc::Receiver<AdhocRequest>,
    shutdown_rx: watch::Receiver<bool>,
    status: Arc<RwLock<SupervisorStatus>>,
}

impl Supervisor {
    pub(crate) fn new(parts: SupervisorParts) -> Self {
        Self {
            config: parts.config,
            store: parts.store,
            oracle: parts.oracle,
            pool: parts.pool,
            audit: parts.audit,
            jobq: Vec::new(),
            schedq: ScheduleQueue::new(),
            runq: RunQueue::new(),
            updates_rx: parts.updates_rx,
            resync_rx: parts.resync_rx,
            adhoc_rx: parts.adhoc_rx,
            shutdown_rx: parts.shutdown_rx,
            status: parts.status,
        }
    }

    /// Run crash recovery, load the job queue, then serve events until shutdown.
    ///
    /// The loop also stops once every [`crate::core::SupervisorHandle`] is dropped.
    ///
    /// # Errors
    ///
    /// Fails only if the initial job queue load fails; once the loop is
    /// running every error is logged and the loop continues.
    pub async fn run(mut self) -> AppResult<()> {
        let started = clock::now();
        self.recover(started);
        self.resync(started).context("initial job queue load failed")?;
        self.publish_status(started);
        info!(
            workers = self.pool.worker_count(),
            jobs = self.jobq.len(),
            scheduled = self.schedq.len(),
            "supervisor started"
        );

        let mut tick = interval(self.config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let purge_every = self.config.purge_interval();
        let mut purge = interval_at(Instant::now() + purge_every, purge_every);
        purge.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                Some(()) = self.resync_rx.recv() => {
                    if let Err(e) = self.resync(clock::now()) {
                        error!(error = %e, "resync failed; keeping previous job queue");
                    }
                }
                _ = purge.tick() => self.purge_tick(clock::now()),
                _ = tick.tick() => self.tick(clock::now()),
                Some(request) = self.adhoc_rx.recv() => self.schedule_adhoc(request, clock::now()),
                Some(update) = self.updates_rx.recv() => self.apply_update(update),
            }
            self.publish_status(clock::now());
        }

        info!(running = self.runq.len(), "supervisor stopping");
        for running in self.runq.iter() {
            warn!(task_id = %running.task.uuid, "abandoning running task at shutdown");
            running.cancel();
        }
        let pool = self.pool;
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .context("worker pool shutdown panicked")?;
        Ok(())
    }

    /// Reload the job queue from the store and compute every job's next run.
    ///
    /// A job whose schedule cannot be computed is kept with no next run and retried every tick.
    ///
    /// # Errors
    ///
    /// Returns the store error; the previous job queue is kept.
    pub fn resync(&mut self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let mut jobs = self.store.get_all_jobs()?;
        for job in &mut jobs {
            match job.reschedule(self.oracle.as_ref(), now) {
                Ok(next) => debug!(job_id = %job.uuid, schedule = %job.schedule, next_run = %next, "initial run computed"),
                Err(e) => error!(job_id = %job.uuid, schedule = %job.schedule, error = %e, "cannot determine next run"),
            }
        }
        info!(jobs = jobs.len(), "job queue resynced");
        self.jobq = jobs;
        Ok(self.jobq.len())
    }

    /// One fast tick: schedule due jobs, sweep deadlines, then dispatch.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.check_schedule(now);
        self.sweep_timeouts(now);
        self.dispatch_pending(now);
    }

    /// Turn every due job into a backup task in the schedule queue, then reschedule it.
    pub fn check_schedule(&mut self, now: DateTime<Utc>) {
        let mut created = Vec::new();
        for job in &mut self.jobq {
            if job.next_run.is_none() {
                if !job.paused {
                    if let Err(e) = job.reschedule(self.oracle.as_ref(), now) {
                        error!(job_id = %job.uuid, schedule = %job.schedule, error = %e, "cannot determine next run");
                    }
                }
                continue;
            }
            if !job.runnable(now) {
                continue;
            }

            info!(job_id = %job.uuid, job = %job.name, "scheduling backup");
            match self.store.create_backup_task(SYSTEM_OWNER, job) {
                Ok(task) => created.push(task),
                Err(e) => {
                    error!(job_id = %job.uuid, error = %e, "failed to create backup task");
                    continue;
                }
            }
            match job.reschedule(self.oracle.as_ref(), now) {
                Ok(next) => debug!(job_id = %job.uuid, next_run = %next, "job rescheduled"),
                Err(e) => error!(job_id = %job.uuid, schedule = %job.schedule, error = %e, "cannot determine next run"),
            }
        }
        for task in created {
            self.enqueue(task, now);
        }
    }

    /// Cancel every queued or running task whose deadline has passed.
    pub fn sweep_timeouts(&mut self, now: DateTime<Utc>) {
        let timeout_secs = self.config.max_timeout_secs;

        for running in self.runq.take_expired(now) {
            let id = running.task.uuid;
            warn!(task_id = %id, op = %running.task.op, timeout_secs, "task exceeded its deadline; canceling");
            running.cancel();
            if let Err(e) = self.store.cancel_task(id, now) {
                error!(task_id = %id, error = %e, "failed to record task cancellation");
            }
            self.record(AuditEvent::task(AuditAction::TaskTimedOut, id).with_detail("running"));
        }

        for queued in self.schedq.take_expired(now) {
            let id = queued.task.uuid;
            warn!(task_id = %id, op = %queued.task.op, timeout_secs, "task deadline passed before dispatch; canceling");
            if let Err(e) = self.store.cancel_task(id, now) {
                error!(task_id = %id, error = %e, "failed to record task cancellation");
            }
            self.record(AuditEvent::task(AuditAction::TaskTimedOut, id).with_detail("scheduled"));
        }
    }

    /// Hand runnable schedule-queue entries to idle workers, in queue order.
    ///
    /// Entries blocked by a conflicting task stay queued; draining stops at
    /// the first entry no worker is free for.
    pub fn dispatch_pending(&mut self, now: DateTime<Utc>) {
        let mut idx = 0;
        while let Some(entry) = self.schedq.get(idx) {
            match self.store.get_task(entry.task.uuid) {
                Ok(stored) if stored.status.is_terminal() => {
                    info!(task_id = %stored.uuid, status = %stored.status, "dropping task that ended before dispatch");
                    self.schedq.remove_at(idx);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(task_id = %entry.task.uuid, error = %e, "failed to read task before dispatch");
                    idx += 1;
                    continue;
                }
            }
            match self.store.is_task_runnable(&entry.task) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(task_id = %entry.task.uuid, "task blocked by a conflicting task");
                    idx += 1;
                    continue;
                }
                Err(e) => {
                    error!(task_id = %entry.task.uuid, error = %e, "failed to check whether task is runnable");
                    idx += 1;
                    continue;
                }
            }

            let (cancel_tx, cancel_rx) = watch::channel(false);
            match self.pool.try_dispatch(entry.task.clone(), cancel_rx) {
                Ok(()) => {}
                Err(PoolError::Busy) => break,
                Err(e) => {
                    error!(error = %e, "worker pool refused dispatch");
                    break;
                }
            }

            let Some(QueuedTask { mut task, deadline }) = self.schedq.remove_at(idx) else {
                break;
            };
            match self.store.start_task(task.uuid, now) {
                Ok(()) => {}
                Err(e @ StoreError::TerminalState { .. }) => {
                    warn!(task_id = %task.uuid, error = %e, "task ended while being dispatched; canceling");
                    if cancel_tx.send(true).is_err() {
                        debug!(task_id = %task.uuid, "worker already finished");
                    }
                    continue;
                }
                Err(e) => error!(task_id = %task.uuid, error = %e, "failed to record task start"),
            }
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
            task.attempts += 1;

            info!(task_id = %task.uuid, op = %task.op, "task sent to a worker");
            self.record(AuditEvent::task(AuditAction::TaskDispatched, task.uuid));
            self.runq.insert(RunningTask {
                task,
                deadline,
                dispatched_at: now,
                cancel: cancel_tx,
            });
        }
    }

    /// Apply one worker update to the store and the run queue.
    ///
    /// Run-queue removal for terminal updates happens whether or not the
    /// store write succeeds, and repeating a terminal update is harmless.
    pub fn apply_update(&mut self, update: WorkerUpdate) {
        match update {
            WorkerUpdate::Output { task, line } => {
                debug!(task_id = %task, "> {line}");
                if let Err(e) = self.store.append_task_log(task, &format!("{line}\n")) {
                    error!(task_id = %task, error = %e, "failed to append task log");
                }
            }
            WorkerUpdate::RestoreKey { task, key, at, ok } => {
                info!(task_id = %task, key = %key, ok, "backup produced a restore key");
                match self.store.create_task_archive(task, &key, at) {
                    Ok(archive) => {
                        self.record(AuditEvent::archive(AuditAction::ArchiveCreated, archive.uuid).with_detail(key));
                        if !ok || !self.may_keep_archive(task) {
                            self.invalidate(archive.uuid);
                        }
                    }
                    Err(e) => error!(task_id = %task, error = %e, "failed to create archive"),
                }
            }
            WorkerUpdate::PurgeArchive { task, archive } => match self.store.purge_archive(archive, clock::now()) {
                Ok(()) => {
                    info!(task_id = %task, archive_id = %archive, "archive purged");
                    self.record(AuditEvent::archive(AuditAction::ArchivePurged, archive));
                }
                Err(e) => error!(task_id = %task, archive_id = %archive, error = %e, "failed to mark archive purged"),
            },
            WorkerUpdate::Stopped { task, at } => {
                let tracked = self.runq.remove(task).is_some();
                match self.store.complete_task(task, at) {
                    Ok(()) => {
                        info!(task_id = %task, stopped_at = %at, "task completed");
                        self.record(AuditEvent::task(AuditAction::TaskCompleted, task));
                    }
                    Err(e) => {
                        Self::log_terminal_write(task, tracked, &e);
                        if matches!(e, StoreError::TerminalState { .. }) {
                            self.invalidate_produced_archive(task);
                        }
                    }
                }
            }
            WorkerUpdate::Failed { task, at } => {
                let tracked = self.runq.remove(task).is_some();
                match self.store.fail_task(task, at) {
                    Ok(()) => {
                        warn!(task_id = %task, stopped_at = %at, "task failed");
                        self.record(AuditEvent::task(AuditAction::TaskFailed, task));
                    }
                    Err(e) => Self::log_terminal_write(task, tracked, &e),
                }
                self.invalidate_produced_archive(task);
            }
        }
    }

    fn log_terminal_write(task: Uuid, tracked: bool, err: &StoreError) {
        if !tracked && matches!(err, StoreError::TerminalState { .. }) {
            debug!(task_id = %task, error = %err, "ignoring late terminal update for a retired task");
        } else {
            error!(task_id = %task, error = %err, "failed to record task outcome");
        }
    }

    /// Create and queue the task an adhoc request asks for, replying exactly once if asked to.
    pub fn schedule_adhoc(&mut self, request: AdhocRequest, now: DateTime<Utc>) {
        let AdhocRequest { owner, op, reply } = request;
        info!(op = %op.operation(), owner = %owner, "scheduling adhoc task");

        let result = self.create_adhoc_task(&owner, &op).map(|task| {
            let id = task.uuid;
            self.enqueue(task, now);
            id
        });
        if let Err(e) = &result {
            warn!(op = %op.operation(), error = %e, "adhoc request rejected");
        }

        if let Some(reply) = reply {
            if reply.send(result).is_err() {
                debug!("adhoc requester went away before the reply");
            }
        }
    }

    fn create_adhoc_task(&self, owner: &str, op: &AdhocOp) -> Result<Task, SchedulerError> {
        match *op {
            AdhocOp::Backup { job } => {
                let job = match self.jobq.iter().find(|j| j.uuid == job) {
                    Some(loaded) => loaded.clone(),
                    None => self.store.get_job(job).map_err(|e| match e {
                        StoreError::NotFound { .. } => SchedulerError::UnknownJob(job),
                        other => other.into(),
                    })?,
                };
                Ok(self.store.create_backup_task(owner, &job)?)
            }
            AdhocOp::Restore { archive, target } => {
                let archive = self.store.get_archive(archive)?;
                if archive.status != ArchiveStatus::Valid {
                    return Err(SchedulerError::Rejected(format!(
                        "archive {} is {} and cannot be restored",
                        archive.uuid, archive.status
                    )));
                }
                let target_id = target.or(archive.target_uuid).ok_or_else(|| {
                    SchedulerError::Rejected(format!("no target given and archive {} has none", archive.uuid))
                })?;
                let target = self.store.get_target(target_id)?;
                Ok(self.store.create_restore_task(owner, &archive, &target)?)
            }
            AdhocOp::Purge { archive } => {
                let archive = self.store.get_archive(archive)?;
                if !archive.status.needs_purge() {
                    return Err(SchedulerError::Rejected(format!(
                        "archive {} is {} and cannot be purged",
                        archive.uuid, archive.status
                    )));
                }
                if self.purge_in_flight(archive.uuid) {
                    return Err(SchedulerError::Rejected(format!(
                        "archive {} already has a purge task",
                        archive.uuid
                    )));
                }
                Ok(self.store.create_purge_task(owner, &archive, &self.config.purge_agent)?)
            }
        }
    }

    /// Put a created task on the schedule queue with a fresh deadline.
    fn enqueue(&mut self, task: Task, now: DateTime<Utc>) -> bool {
        let id = task.uuid;
        let op = task.op;
        let deadline = now
            .checked_add_signed(self.config.max_timeout())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if !self.schedq.push(task, deadline) {
            debug!(task_id = %id, "task already scheduled");
            return false;
        }
        debug!(task_id = %id, op = %op, deadline = %deadline, "task scheduled");
        self.record(AuditEvent::task(AuditAction::TaskScheduled, id).with_detail(op.as_str()));
        true
    }

    fn purge_in_flight(&self, archive: Uuid) -> bool {
        self.schedq.has_purge_for(archive) || self.runq.has_purge_for(archive)
    }

    /// Only a backup still running or already done may leave a valid archive.
    fn may_keep_archive(&self, task: Uuid) -> bool {
        match self.store.get_task(task) {
            Ok(t) => matches!(t.status, TaskStatus::Running | TaskStatus::Done),
            Err(e) => {
                error!(task_id = %task, error = %e, "failed to read task of new archive");
                false
            }
        }
    }

    /// Mark an archive invalid. Returns whether the store accepted it.
    fn invalidate(&self, archive: Uuid) -> bool {
        match self.store.invalidate_archive(archive) {
            Ok(()) => {
                warn!(archive_id = %archive, "archive invalidated");
                self.record(AuditEvent::archive(AuditAction::ArchiveInvalidated, archive));
                true
            }
            Err(e) => {
                error!(archive_id = %archive, error = %e, "failed to invalidate archive");
                false
            }
        }
    }

    /// A backup that did not succeed must not leave its archive valid.
    fn invalidate_produced_archive(&self, task: Uuid) {
        let Ok(task) = self.store.get_task(task) else {
            return;
        };
        if task.op != Operation::Backup {
            return;
        }
        let Some(archive) = task.archive_uuid else {
            return;
        };
        match self.store.get_archive(archive) {
            Ok(a) if a.status == ArchiveStatus::Valid => {
                self.invalidate(archive);
            }
            Ok(_) => {}
            Err(e) => error!(archive_id = %archive, error = %e, "failed to look up archive of failed backup"),
        }
    }

    fn record(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }

    /// Publish a status snapshot for [`crate::core::SupervisorHandle::status`].
    pub fn publish_status(&self, now: DateTime<Utc>) {
        let brief = |task: &Task, deadline: DateTime<Utc>| TaskBrief {
            uuid: task.uuid,
            op: task.op,
            owner: task.owner.clone(),
            status: task.status,
            deadline,
            remaining_ms: clock::remaining_ms(deadline, now),
        };
        let status = SupervisorStatus {
            jobs: self.jobq.len(),
            scheduled: self.schedq.iter().map(|q| brief(&q.task, q.deadline)).collect(),
            running: self.runq.iter().map(|r| brief(&r.task, r.deadline)).collect(),
            pool: self.pool.stats(),
            updated_at: Some(now),
        };
        *self.status.write() = status;
    }

    /// Wait for the next worker update.
    pub async fn next_update(&mut self) -> Option<WorkerUpdate> {
        self.updates_rx.recv().await
    }

    /// Next worker update if one is already waiting.
    pub fn try_next_update(&mut self) -> Option<WorkerUpdate> {
        self.updates_rx.try_recv().ok()
    }

    /// The in-memory job queue.
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobq
    }

    /// Mutable access to the in-memory job queue; edits are lost on the next resync.
    pub fn jobs_mut(&mut self) -> &mut [Job] {
        &mut self.jobq
    }

    /// Tasks waiting for a worker.
    #[must_use]
    pub const fn schedule_queue(&self) -> &ScheduleQueue {
        &self.schedq
    }

    /// Tasks held by workers.
    #[must_use]
    pub const fn run_queue(&self) -> &RunQueue {
        &self.runq
    }

    /// Worker pool utilization.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }
}
