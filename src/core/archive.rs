//! Archives produced by backups, and the targets they restore into.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::PluginConfig;

/// Lifecycle of an archive: `valid -> expired -> purged`, or `valid -> invalid -> purged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    /// Restorable.
    Valid,
    /// Produced by a task that did not succeed.
    Invalid,
    /// Outlived its retention policy.
    Expired,
    /// Removed from its store. Terminal.
    Purged,
}

impl ArchiveStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Purged => "purged",
        }
    }

    /// Archives that are neither valid nor purged need a purge task.
    #[must_use]
    pub const fn needs_purge(self) -> bool {
        matches!(self, Self::Invalid | Self::Expired)
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable artifact of a successful backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    /// Unique identifier.
    pub uuid: Uuid,
    /// Job whose backup produced it.
    pub job_uuid: Option<Uuid>,
    /// Target it was taken from.
    pub target_uuid: Option<Uuid>,
    /// Store plugin and endpoint holding the data.
    pub store: PluginConfig,
    /// Content-addressed restore key returned by the store.
    pub store_key: String,
    /// When the backup produced it.
    pub taken_at: DateTime<Utc>,
    /// When retention runs out.
    pub expires_at: DateTime<Utc>,
    /// Current status.
    pub status: ArchiveStatus,
    /// Status the archive had when it was purged.
    #[serde(default)]
    pub purge_reason: Option<ArchiveStatus>,
    /// When it was purged.
    #[serde(default)]
    pub purged_at: Option<DateTime<Utc>>,
}

/// A restore destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Unique identifier.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Plugin and endpoint.
    pub config: PluginConfig,
    /// Agent address the plugin runs on.
    pub agent: String,
}
