//! Startup sweeps over tasks left behind by a previous process.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::Supervisor;
use crate::core::{ArchiveStatus, AuditAction, AuditEvent, Operation, TaskFilter, TaskStatus, SYSTEM_OWNER};

/// What the startup sweeps did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Tasks found `Running` and marked `Failed`.
    pub failed: usize,
    /// Purge tasks scheduled for archives of interrupted backups.
    pub purges_scheduled: usize,
    /// `Pending` tasks put back on the schedule queue.
    pub rescheduled: usize,
    /// Records that could not be recovered.
    pub errors: usize,
}

impl RecoveryReport {
    fn merge(self, other: Self) -> Self {
        Self {
            failed: self.failed + other.failed,
            purges_scheduled: self.purges_scheduled + other.purges_scheduled,
            rescheduled: self.rescheduled + other.rescheduled,
            errors: self.errors + other.errors,
        }
    }
}

impl Supervisor {
    /// Run both startup sweeps: fail unfinished tasks, then reschedule pending ones.
    pub fn recover(&mut self, now: DateTime<Utc>) -> RecoveryReport {
        let report = self
            .fail_unfinished_tasks(now)
            .merge(self.reschedule_pending_tasks(now));
        info!(
            failed = report.failed,
            purges = report.purges_scheduled,
            rescheduled = report.rescheduled,
            errors = report.errors,
            "startup recovery finished"
        );
        report
    }

    /// Mark every `Running` task `Failed`; a backup that already produced an
    /// archive gets that archive invalidated and a purge task scheduled.
    pub fn fail_unfinished_tasks(&mut self, now: DateTime<Utc>) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let tasks = match self.store.get_tasks(&TaskFilter::with_status(TaskStatus::Running)) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to list running tasks at startup");
                report.errors += 1;
                return report;
            }
        };

        for task in tasks {
            warn!(task_id = %task.uuid, "found task in running state at startup; setting to failed");
            if let Err(e) = self.store.fail_task(task.uuid, now) {
                error!(task_id = %task.uuid, error = %e, "failed to fail leftover running task");
                report.errors += 1;
                continue;
            }
            report.failed += 1;
            self.record(AuditEvent::task(AuditAction::TaskFailed, task.uuid).with_detail("running at startup"));

            if task.op != Operation::Backup {
                continue;
            }
            let Some(archive_id) = task.archive_uuid else {
                continue;
            };
            let mut archive = match self.store.get_archive(archive_id) {
                Ok(archive) => archive,
                Err(e) => {
                    warn!(task_id = %task.uuid, archive_id = %archive_id, error = %e, "unable to retrieve archive of interrupted backup");
                    report.errors += 1;
                    continue;
                }
            };

            if archive.status == ArchiveStatus::Valid {
                if !self.invalidate(archive.uuid) {
                    report.errors += 1;
                    continue;
                }
                archive.status = ArchiveStatus::Invalid;
            }
            if !archive.status.needs_purge() || self.purge_in_flight(archive.uuid) {
                continue;
            }

            warn!(task_id = %task.uuid, archive_id = %archive.uuid, "purging archive of interrupted backup");
            match self
                .store
                .create_purge_task(SYSTEM_OWNER, &archive, &self.config.purge_agent)
            {
                Ok(purge) => {
                    if self.enqueue(purge, now) {
                        report.purges_scheduled += 1;
                    }
                }
                Err(e) => {
                    error!(archive_id = %archive.uuid, error = %e, "failed to schedule purge of interrupted backup");
                    report.errors += 1;
                }
            }
        }
        report
    }

    /// Put every `Pending` task back on the schedule queue with a fresh deadline.
    ///
    /// Tasks already queued are left where they are.
    pub fn reschedule_pending_tasks(&mut self, now: DateTime<Utc>) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let tasks = match self.store.get_tasks(&TaskFilter::with_status(TaskStatus::Pending)) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to list pending tasks at startup");
                report.errors += 1;
                return report;
            }
        };
        for task in tasks {
            if self.enqueue(task, now) {
                report.rescheduled += 1;
            }
        }
        report
    }
}
