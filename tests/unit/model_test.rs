//! Tests for the job, task and archive model

use backup_supervisor::core::{
    Archive, ArchiveStatus, Job, Operation, PluginConfig, Retention, Target, Task, TaskStatus,
    SYSTEM_OWNER,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

fn job() -> Job {
    serde_json::from_value(json!({
        "uuid": Uuid::new_v4(),
        "name": "db",
        "paused": false,
        "schedule": "daily 4am",
        "retention": {"days": 14, "count": null},
        "target_uuid": Uuid::new_v4(),
        "target": {"plugin": "postgres", "endpoint": {"host": "db1"}},
        "store_uuid": Uuid::new_v4(),
        "store": {"plugin": "s3", "endpoint": {"bucket": "b"}},
        "agent": "db1:5444",
    }))
    .unwrap()
}

#[test]
fn test_job_deserializes_without_next_run() {
    let j = job();
    assert_eq!(j.next_run, None);
    assert_eq!(j.retention, Retention::days(14));
    assert!(!j.runnable(Utc::now()));
}

#[test]
fn test_backup_task_carries_job_plugins() {
    let j = job();
    let task = Task::backup(SYSTEM_OWNER, &j, Utc::now());
    assert_eq!(task.op, Operation::Backup);
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.agent, "db1:5444");
    assert_eq!(task.target.as_ref().unwrap().plugin, "postgres");
    assert_eq!(task.store.as_ref().unwrap().endpoint["bucket"], "b");
    assert_eq!(task.attempts, 0);
}

#[test]
fn test_restore_task_runs_on_destination_agent() {
    let j = job();
    let archive = Archive {
        uuid: Uuid::new_v4(),
        job_uuid: Some(j.uuid),
        target_uuid: Some(j.target_uuid),
        store: j.store.clone(),
        store_key: "sha256:feed".into(),
        taken_at: Utc::now(),
        expires_at: Utc::now(),
        status: ArchiveStatus::Valid,
        purge_reason: None,
        purged_at: None,
    };
    let dest = Target {
        uuid: Uuid::new_v4(),
        name: "staging".into(),
        config: PluginConfig::new("postgres", json!({"host": "db2"})),
        agent: "db2:5444".into(),
    };

    let task = Task::restore("alice", &archive, &dest, Utc::now());
    assert_eq!(task.agent, "db2:5444");
    assert_eq!(task.target_uuid, Some(dest.uuid));
    assert_eq!(task.restore_key.as_deref(), Some("sha256:feed"));

    let purge = Task::purge(SYSTEM_OWNER, &archive, "purger:5444", Utc::now());
    assert_eq!(purge.target_uuid, None);
    assert_eq!(purge.archive_uuid, Some(archive.uuid));
}

#[test]
fn test_archive_status_lifecycle() {
    assert!(!ArchiveStatus::Valid.needs_purge());
    assert!(ArchiveStatus::Invalid.needs_purge());
    assert!(ArchiveStatus::Expired.needs_purge());
    assert!(!ArchiveStatus::Purged.needs_purge());
    assert_eq!(serde_json::to_value(ArchiveStatus::Expired).unwrap(), "expired");
}
