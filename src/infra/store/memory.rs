//! In-memory durable store for development and tests.
//!
//! Honours the same invariants a database-backed store must: tasks never
//! leave a terminal status, valid and purged archives are never purged, and a
//! task against a target is not runnable while another task on that target
//! is running.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::{
    Archive, ArchiveStatus, Job, Store, StoreError, StoreResult, Target, Task, TaskFilter,
    TaskStatus,
};
use crate::util::clock;

#[derive(Default)]
struct State {
    jobs: Vec<Job>,
    targets: Vec<Target>,
    tasks: Vec<Task>,
    archives: Vec<Archive>,
}

impl State {
    fn task_mut(&mut self, id: Uuid) -> StoreResult<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.uuid == id)
            .ok_or(StoreError::NotFound { kind: "task", id })
    }

    fn archive_mut(&mut self, id: Uuid) -> StoreResult<&mut Archive> {
        self.archives
            .iter_mut()
            .find(|a| a.uuid == id)
            .ok_or(StoreError::NotFound { kind: "archive", id })
    }

    fn transition(&mut self, id: Uuid, to: TaskStatus, at: DateTime<Utc>) -> StoreResult<()> {
        let task = self.task_mut(id)?;
        if task.status.is_terminal() {
            return Err(StoreError::TerminalState {
                id,
                status: task.status.to_string(),
                requested: to.to_string(),
            });
        }
        task.status = to;
        if to == TaskStatus::Running {
            task.started_at = Some(at);
            task.attempts += 1;
        } else {
            task.stopped_at = Some(at);
        }
        Ok(())
    }

    fn set_archive_status(&mut self, id: Uuid, status: ArchiveStatus) -> StoreResult<()> {
        let archive = self.archive_mut(id)?;
        if archive.status == ArchiveStatus::Purged {
            return Err(StoreError::ArchivePurged(id));
        }
        archive.status = status;
        Ok(())
    }
}

/// Store keeping every record in memory behind a single lock.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a job definition.
    pub fn put_job(&self, job: Job) {
        let mut state = self.state.lock();
        match state.jobs.iter_mut().find(|j| j.uuid == job.uuid) {
            Some(existing) => *existing = job,
            None => state.jobs.push(job),
        }
    }

    /// Remove a job definition. Returns whether it existed.
    pub fn remove_job(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state.jobs.retain(|j| j.uuid != id);
        state.jobs.len() != before
    }

    /// Insert or replace a target.
    pub fn put_target(&self, target: Target) {
        let mut state = self.state.lock();
        match state.targets.iter_mut().find(|t| t.uuid == target.uuid) {
            Some(existing) => *existing = target,
            None => state.targets.push(target),
        }
    }

    /// Insert or replace an archive.
    pub fn put_archive(&self, archive: Archive) {
        let mut state = self.state.lock();
        match state.archives.iter_mut().find(|a| a.uuid == archive.uuid) {
            Some(existing) => *existing = archive,
            None => state.archives.push(archive),
        }
    }

    /// Insert a task record as-is, e.g. one left over from a previous run.
    pub fn put_task(&self, task: Task) {
        let mut state = self.state.lock();
        match state.tasks.iter_mut().find(|t| t.uuid == task.uuid) {
            Some(existing) => *existing = task,
            None => state.tasks.push(task),
        }
    }

    /// Every task, in creation order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    /// Every archive, in creation order.
    #[must_use]
    pub fn archives(&self) -> Vec<Archive> {
        self.state.lock().archives.clone()
    }

    fn insert_task(&self, task: Task) -> Task {
        self.state.lock().tasks.push(task.clone());
        task
    }
}

impl Store for InMemoryStore {
    fn get_all_jobs(&self) -> StoreResult<Vec<Job>> {
        Ok(self.state.lock().jobs.clone())
    }

    fn get_job(&self, id: Uuid) -> StoreResult<Job> {
        self.state
            .lock()
            .jobs
            .iter()
            .find(|j| j.uuid == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "job", id })
    }

    fn get_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .state
            .lock()
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.requested_at);
        Ok(tasks)
    }

    fn get_task(&self, id: Uuid) -> StoreResult<Task> {
        self.state
            .lock()
            .tasks
            .iter()
            .find(|t| t.uuid == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "task", id })
    }

    fn get_archive(&self, id: Uuid) -> StoreResult<Archive> {
        self.state
            .lock()
            .archives
            .iter()
            .find(|a| a.uuid == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "archive", id })
    }

    fn get_target(&self, id: Uuid) -> StoreResult<Target> {
        self.state
            .lock()
            .targets
            .iter()
            .find(|t| t.uuid == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "target", id })
    }

    fn create_backup_task(&self, owner: &str, job: &Job) -> StoreResult<Task> {
        Ok(self.insert_task(Task::backup(owner, job, clock::now())))
    }

    fn create_restore_task(&self, owner: &str, archive: &Archive, target: &Target) -> StoreResult<Task> {
        Ok(self.insert_task(Task::restore(owner, archive, target, clock::now())))
    }

    fn create_purge_task(&self, owner: &str, archive: &Archive, agent: &str) -> StoreResult<Task> {
        Ok(self.insert_task(Task::purge(owner, archive, agent, clock::now())))
    }

    fn is_task_runnable(&self, task: &Task) -> StoreResult<bool> {
        let Some(target) = task.target_uuid else {
            return Ok(true);
        };
        let state = self.state.lock();
        let busy = state
            .tasks
            .iter()
            .any(|t| t.uuid != task.uuid && t.status == TaskStatus::Running && t.target_uuid == Some(target));
        Ok(!busy)
    }

    fn start_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.state.lock().transition(id, TaskStatus::Running, at)
    }

    fn complete_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.state.lock().transition(id, TaskStatus::Done, at)
    }

    fn fail_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.state.lock().transition(id, TaskStatus::Failed, at)
    }

    fn cancel_task(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.state.lock().transition(id, TaskStatus::Canceled, at)
    }

    fn append_task_log(&self, id: Uuid, line: &str) -> StoreResult<()> {
        self.state.lock().task_mut(id)?.log.push_str(line);
        Ok(())
    }

    fn create_task_archive(&self, id: Uuid, key: &str, at: DateTime<Utc>) -> StoreResult<Archive> {
        if key.trim().is_empty() {
            return Err(StoreError::MissingRestoreKey(id));
        }
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter()
            .find(|t| t.uuid == id)
            .ok_or(StoreError::NotFound { kind: "task", id })?;
        let job_id = task.job_uuid.ok_or(StoreError::NotFound { kind: "job", id })?;
        let job = state
            .jobs
            .iter()
            .find(|j| j.uuid == job_id)
            .ok_or(StoreError::NotFound { kind: "job", id: job_id })?;

        let archive = Archive {
            uuid: Uuid::new_v4(),
            job_uuid: Some(job.uuid),
            target_uuid: task.target_uuid,
            store: task.store.clone().unwrap_or_else(|| job.store.clone()),
            store_key: key.to_string(),
            taken_at: at,
            expires_at: at + Duration::days(i64::from(job.retention.days)),
            status: ArchiveStatus::Valid,
            purge_reason: None,
            purged_at: None,
        };
        state.task_mut(id)?.archive_uuid = Some(archive.uuid);
        state.archives.push(archive.clone());
        Ok(archive)
    }

    fn invalidate_archive(&self, id: Uuid) -> StoreResult<()> {
        self.state.lock().set_archive_status(id, ArchiveStatus::Invalid)
    }

    fn expire_archive(&self, id: Uuid) -> StoreResult<()> {
        self.state.lock().set_archive_status(id, ArchiveStatus::Expired)
    }

    fn purge_archive(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock();
        let archive = state.archive_mut(id)?;
        match archive.status {
            ArchiveStatus::Valid => Err(StoreError::PurgeValidArchive(id)),
            ArchiveStatus::Purged => Err(StoreError::ArchivePurged(id)),
            reason => {
                archive.purge_reason = Some(reason);
                archive.status = ArchiveStatus::Purged;
                archive.purged_at = Some(at);
                Ok(())
            }
        }
    }

    /// Valid archives past their expiry, plus the oldest valid archives of a
    /// job beyond its retention count.
    fn get_expired_archives(&self, now: DateTime<Utc>) -> StoreResult<Vec<Archive>> {
        let state = self.state.lock();
        let valid: Vec<&Archive> = state
            .archives
            .iter()
            .filter(|a| a.status == ArchiveStatus::Valid)
            .collect();

        let mut expired: HashSet<Uuid> = valid
            .iter()
            .filter(|a| a.expires_at < now)
            .map(|a| a.uuid)
            .collect();

        let mut per_job: HashMap<Uuid, Vec<&Archive>> = HashMap::new();
        for archive in &valid {
            if let Some(job) = archive.job_uuid {
                per_job.entry(job).or_default().push(archive);
            }
        }
        for job in &state.jobs {
            let (Some(keep), Some(archives)) = (job.retention.count, per_job.get_mut(&job.uuid)) else {
                continue;
            };
            archives.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
            let keep = usize::try_from(keep).unwrap_or(usize::MAX);
            expired.extend(archives.iter().skip(keep).map(|a| a.uuid));
        }

        Ok(valid
            .into_iter()
            .filter(|a| expired.contains(&a.uuid))
            .cloned()
            .collect())
    }

    fn get_archives_needing_purge(&self) -> StoreResult<Vec<Archive>> {
        Ok(self
            .state
            .lock()
            .archives
            .iter()
            .filter(|a| a.status.needs_purge())
            .cloned()
            .collect())
    }
}
