//! Tests for the API-facing models

use backup_supervisor::core::{AdhocOp, Operation, SupervisorStatus};
use backup_supervisor::runtime::{AdhocSubmission, Health, TaskSubmitted};
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_submission_parses_each_operation() {
    let archive = Uuid::new_v4();
    let target = Uuid::new_v4();

    let restore: AdhocSubmission = serde_json::from_value(json!({
        "owner": "alice",
        "op": "restore",
        "archive": archive,
        "target": target,
    }))
    .unwrap();
    assert_eq!(restore.owner, "alice");
    assert_eq!(
        restore.op,
        AdhocOp::Restore {
            archive,
            target: Some(target)
        }
    );

    let purge: AdhocSubmission = serde_json::from_value(json!({"op": "purge", "archive": archive})).unwrap();
    assert_eq!(purge.owner, "anonymous");
    assert_eq!(purge.op.operation(), Operation::Purge);

    let job = Uuid::new_v4();
    let backup: AdhocSubmission = serde_json::from_value(json!({"owner": "ops", "op": "backup", "job": job})).unwrap();
    assert_eq!(backup.op, AdhocOp::Backup { job });
}

#[test]
fn test_submission_rejects_unknown_operation() {
    let result = serde_json::from_value::<AdhocSubmission>(json!({"op": "delete", "archive": Uuid::new_v4()}));
    assert!(result.is_err());
}

#[test]
fn test_task_submitted_omits_empty_fields() {
    let ok = TaskSubmitted {
        ok: true,
        task_uuid: Some(Uuid::nil()),
        error: None,
    };
    let value = serde_json::to_value(&ok).unwrap();
    assert_eq!(value["ok"], true);
    assert!(value.get("error").is_none());

    let failed = TaskSubmitted {
        ok: false,
        task_uuid: None,
        error: Some("supervisor unavailable".into()),
    };
    let value = serde_json::to_value(&failed).unwrap();
    assert!(value.get("task_uuid").is_none());
    assert_eq!(value["error"], "supervisor unavailable");
}

#[test]
fn test_status_and_health_serialize() {
    let status = serde_json::to_value(SupervisorStatus::default()).unwrap();
    assert_eq!(status["jobs"], 0);
    assert!(status["scheduled"].as_array().unwrap().is_empty());
    assert_eq!(status["pool"]["worker_count"], 0);

    assert_eq!(serde_json::to_string(&Health { ok: true }).unwrap(), r#"{"ok":true}"#);
}
