//! API-facing request/response models and the calls an HTTP layer makes on a supervisor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AdhocOp, SupervisorHandle, SupervisorStatus};

fn default_owner() -> String {
    "anonymous".to_string()
}

/// Adhoc task submission payload.
///
/// ```json
/// {"owner": "alice", "op": "restore", "archive": "6f0c...", "target": null}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocSubmission {
    /// Requesting actor.
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Requested operation.
    #[serde(flatten)]
    pub op: AdhocOp,
}

/// Outcome of an adhoc submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmitted {
    /// Whether a task was created.
    pub ok: bool,
    /// The new task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_uuid: Option<Uuid>,
    /// Why no task was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Submit adhoc work and report the new task or the error as text.
pub async fn submit_adhoc(handle: &SupervisorHandle, req: AdhocSubmission) -> TaskSubmitted {
    match handle.submit(req.owner, req.op).await {
        Ok(id) => TaskSubmitted {
            ok: true,
            task_uuid: Some(id),
            error: None,
        },
        Err(e) => TaskSubmitted {
            ok: false,
            task_uuid: None,
            error: Some(e.to_string()),
        },
    }
}

/// Signal that job, target, store, schedule or retention records changed.
///
/// # Errors
///
/// Returns a message when the supervisor is no longer running.
pub fn notify_changed(handle: &SupervisorHandle) -> Result<(), String> {
    handle.resync().map_err(|e| e.to_string())
}

/// Backlog and worker status.
#[must_use]
pub fn status(handle: &SupervisorHandle) -> SupervisorStatus {
    handle.status()
}

/// Liveness of the control loop.
#[must_use]
pub fn health(handle: &SupervisorHandle) -> Health {
    Health {
        ok: handle.is_running(),
    }
}
