//! Archive retention: expiration and purge scheduling.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::Supervisor;
use crate::core::{AuditAction, AuditEvent, SYSTEM_OWNER};

impl Supervisor {
    /// One purge tick.
    ///
    /// Purges are scheduled before expiration runs, so a freshly expired
    /// archive waits one purge interval before its purge task is created.
    pub fn purge_tick(&mut self, now: DateTime<Utc>) {
        let scheduled = self.schedule_purges(now);
        let expired = self.expire_archives(now);
        debug!(scheduled, expired, "purge tick done");
    }

    /// Mark every valid archive past its retention `expired`.
    pub fn expire_archives(&mut self, now: DateTime<Utc>) -> usize {
        debug!("scanning for archives that outlived their retention policy");
        let archives = match self.store.get_expired_archives(now) {
            Ok(archives) => archives,
            Err(e) => {
                error!(error = %e, "failed to list archives past retention");
                return 0;
            }
        };

        let mut expired = 0;
        for archive in archives {
            info!(archive_id = %archive.uuid, expires_at = %archive.expires_at, "archive outlived its retention; marking expired");
            match self.store.expire_archive(archive.uuid) {
                Ok(()) => {
                    expired += 1;
                    self.record(AuditEvent::archive(AuditAction::ArchiveExpired, archive.uuid));
                }
                Err(e) => error!(archive_id = %archive.uuid, error = %e, "failed to mark archive expired"),
            }
        }
        expired
    }

    /// Schedule a purge task for every archive that is neither valid nor purged.
    ///
    /// Archives that already have a purge task queued or running are skipped.
    pub fn schedule_purges(&mut self, now: DateTime<Utc>) -> usize {
        debug!("scanning for archives that need purging");
        let archives = match self.store.get_archives_needing_purge() {
            Ok(archives) => archives,
            Err(e) => {
                error!(error = %e, "failed to list archives needing purge");
                return 0;
            }
        };

        let mut scheduled = 0;
        for archive in archives {
            if self.purge_in_flight(archive.uuid) {
                debug!(archive_id = %archive.uuid, "purge already in flight");
                continue;
            }
            info!(archive_id = %archive.uuid, status = %archive.status, "requesting purge of archive");
            match self
                .store
                .create_purge_task(SYSTEM_OWNER, &archive, &self.config.purge_agent)
            {
                Ok(task) => {
                    if self.enqueue(task, now) {
                        scheduled += 1;
                    }
                }
                Err(e) => error!(archive_id = %archive.uuid, error = %e, "failed to schedule purge"),
            }
        }
        scheduled
    }
}
