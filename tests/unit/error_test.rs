//! Tests for error types

use backup_supervisor::core::{PipelineError, ScheduleError, SchedulerError, StoreError};
use uuid::Uuid;

#[test]
fn test_store_error_display() {
    let id = Uuid::nil();
    let err = StoreError::NotFound { kind: "archive", id };
    assert_eq!(err.to_string(), format!("archive {id} not found"));

    let err = StoreError::TerminalState {
        id,
        status: "done".into(),
        requested: "failed".into(),
    };
    assert!(err.to_string().contains("already done"));
    assert!(err.to_string().contains("failed"));

    assert!(StoreError::PurgeValidArchive(id).to_string().contains("valid archive"));
}

#[test]
fn test_scheduler_error_wraps_store_and_schedule_errors() {
    let store: SchedulerError = StoreError::Backend("connection reset".into()).into();
    assert!(matches!(store, SchedulerError::Store(StoreError::Backend(_))));
    assert_eq!(store.to_string(), "store error: backend error: connection reset");

    let schedule: SchedulerError = ScheduleError::NotInFuture("daily".into()).into();
    assert!(matches!(schedule, SchedulerError::Schedule(_)));
    assert!(schedule.to_string().contains("daily"));
}

#[test]
fn test_pipeline_error_from_io() {
    let err: PipelineError = std::io::Error::new(std::io::ErrorKind::NotFound, "no such pipe").into();
    assert!(matches!(err, PipelineError::Io(_)));
    assert_eq!(PipelineError::Canceled.to_string(), "canceled");
}

#[test]
fn test_errors_convert_to_anyhow() {
    let result: anyhow::Result<()> = Err(SchedulerError::Unavailable.into());
    assert_eq!(result.unwrap_err().to_string(), "supervisor unavailable");
}
