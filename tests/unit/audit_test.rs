//! Tests for audit sink

use backup_supervisor::core::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
use uuid::Uuid;

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let task = Uuid::new_v4();

    sink.record(AuditEvent::task(AuditAction::TaskScheduled, task).with_detail("backup"));
    sink.record(AuditEvent::task(AuditAction::TaskDispatched, task));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, AuditAction::TaskScheduled);
    assert_eq!(events[0].task_id, Some(task));
    assert_eq!(events[0].detail.as_deref(), Some("backup"));
    assert_eq!(sink.with_action(AuditAction::TaskDispatched).len(), 1);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    for action in [AuditAction::TaskScheduled, AuditAction::TaskDispatched, AuditAction::TaskCompleted] {
        sink.record(AuditEvent::task(action, Uuid::new_v4()));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, AuditAction::TaskDispatched);
    assert_eq!(events[1].action, AuditAction::TaskCompleted);
}

#[test]
fn test_archive_event() {
    let archive = Uuid::new_v4();
    let event = AuditEvent::archive(AuditAction::ArchiveExpired, archive);
    assert_eq!(event.archive_id, Some(archive));
    assert_eq!(event.task_id, None);
    assert_eq!(event.action.to_string(), "archive_expired");

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "archive_expired");
}
