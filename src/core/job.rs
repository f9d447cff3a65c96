//! Recurring backup definitions and their scheduling rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{PluginConfig, ScheduleError, ScheduleOracle};

/// How long archives produced by a job are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// Calendar days an archive stays valid after it is taken.
    pub days: u32,
    /// Keep at most this many valid archives per job; older ones expire.
    pub count: Option<u32>,
}

impl Retention {
    /// Retention by age only.
    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self { days, count: None }
    }
}

/// A recurring backup definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Paused jobs never fire.
    pub paused: bool,
    /// Recurrence spec, interpreted by the schedule oracle.
    pub schedule: String,
    /// Retention policy for produced archives.
    pub retention: Retention,
    /// Target record the job backs up.
    pub target_uuid: Uuid,
    /// Target plugin and endpoint.
    pub target: PluginConfig,
    /// Store record the job writes to.
    pub store_uuid: Uuid,
    /// Store plugin and endpoint.
    pub store: PluginConfig,
    /// Agent address the backup runs against.
    pub agent: String,
    /// Next time the job is eligible to fire; `None` until first computed.
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
}

impl Job {
    /// A job is runnable when it is not paused and its next run is due.
    #[must_use]
    pub fn runnable(&self, now: DateTime<Utc>) -> bool {
        !self.paused && self.next_run.is_some_and(|at| at <= now)
    }

    /// Recompute `next_run` as the first occurrence strictly after `now`.
    ///
    /// On error `next_run` is left untouched.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures, and rejects answers that are not after `now`.
    pub fn reschedule(
        &mut self,
        oracle: &dyn ScheduleOracle,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let next = oracle.next_after(&self.schedule, now)?;
        if next <= now {
            return Err(ScheduleError::NotInFuture(self.schedule.clone()));
        }
        self.next_run = Some(next);
        Ok(next)
    }
}
