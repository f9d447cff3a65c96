//! Shared fixtures for the supervisor integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backup_supervisor::builders::SupervisorBuilder;
use backup_supervisor::config::SupervisorConfig;
use backup_supervisor::core::{
    Archive, ArchiveStatus, AuditSink, Job, Operation, OutputSink, PipelineError, PipelineOutput,
    PluginConfig, PluginExecutor, Retention, ScheduleError, ScheduleOracle, Supervisor,
    SupervisorHandle, Target, Task, WorkerUpdate,
};
use backup_supervisor::infra::InMemoryStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

// ============================================================================
// SCHEDULE ORACLE
// ============================================================================

/// Fires every N seconds; the schedule "bogus" is malformed.
pub struct Every(pub i64);

impl ScheduleOracle for Every {
    fn next_after(&self, spec: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        if spec == "bogus" {
            return Err(ScheduleError::Malformed {
                spec: spec.to_string(),
                reason: "unknown keyword".into(),
            });
        }
        Ok(after + chrono::Duration::seconds(self.0))
    }
}

// ============================================================================
// SCRIPTED EXECUTOR
// ============================================================================

/// What a scripted pipeline does for one operation.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Print `{"key": ...}` and exit cleanly.
    Key(&'static str),
    /// Print `{"key": ...}` but exit non-zero.
    KeyThenFail(&'static str),
    /// Exit cleanly, printing these lines.
    Succeed(&'static str),
    /// Exit non-zero.
    Fail,
    /// Never finish.
    Hang,
}

/// Executor whose behaviour is scripted per operation. Defaults to `Succeed("")`.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    outcomes: Arc<Mutex<HashMap<Operation, Outcome>>>,
    runs: Arc<AtomicUsize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, op: Operation, outcome: Outcome) -> Self {
        self.outcomes.lock().insert(op, outcome);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginExecutor for ScriptedExecutor {
    async fn run(&self, task: &Task, output: &OutputSink) -> Result<PipelineOutput, PipelineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .get(&task.op)
            .cloned()
            .unwrap_or(Outcome::Succeed(""));
        output.line(format!("running {} for {}", task.op, task.uuid));

        match outcome {
            Outcome::Key(key) => Ok(PipelineOutput::ok(format!(r#"{{"key":"{key}"}}"#))),
            Outcome::KeyThenFail(key) => Ok(PipelineOutput::failed(format!(r#"{{"key":"{key}"}}"#))),
            Outcome::Succeed(stdout) => Ok(PipelineOutput::ok(stdout)),
            Outcome::Fail => Ok(PipelineOutput::failed("")),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

pub fn config(workers: usize) -> SupervisorConfig {
    SupervisorConfig {
        workers,
        purge_agent: "127.0.0.1:5444".into(),
        max_timeout_secs: 5,
        tick_interval_ms: 20,
        purge_interval_secs: 3600,
        reply_timeout_ms: 2_000,
        ..SupervisorConfig::default()
    }
}

pub fn job(name: &str, retention: Retention) -> Job {
    Job {
        uuid: Uuid::new_v4(),
        name: name.into(),
        paused: false,
        schedule: "every hour".into(),
        retention,
        target_uuid: Uuid::new_v4(),
        target: PluginConfig::new("fs", serde_json::json!({"base_dir": "/var/data"})),
        store_uuid: Uuid::new_v4(),
        store: PluginConfig::new("s3", serde_json::json!({"bucket": "backups"})),
        agent: "10.0.0.5:5444".into(),
        next_run: None,
    }
}

pub fn target_for(job: &Job) -> Target {
    Target {
        uuid: job.target_uuid,
        name: format!("{} target", job.name),
        config: job.target.clone(),
        agent: job.agent.clone(),
    }
}

pub fn archive(job: &Job, status: ArchiveStatus, taken_at: DateTime<Utc>) -> Archive {
    Archive {
        uuid: Uuid::new_v4(),
        job_uuid: Some(job.uuid),
        target_uuid: Some(job.target_uuid),
        store: job.store.clone(),
        store_key: format!("key-{}", Uuid::new_v4()),
        taken_at,
        expires_at: taken_at + chrono::Duration::days(i64::from(job.retention.days)),
        status,
        purge_reason: None,
        purged_at: None,
    }
}

/// Store holding one job and its target.
pub fn seeded_store() -> (Arc<InMemoryStore>, Job) {
    let store = Arc::new(InMemoryStore::new());
    let j = job("nightly", Retention::days(7));
    store.put_job(j.clone());
    store.put_target(target_for(&j));
    (store, j)
}

// ============================================================================
// SUPERVISOR DRIVING
// ============================================================================

pub fn build(
    store: &Arc<InMemoryStore>,
    executor: ScriptedExecutor,
    config: SupervisorConfig,
) -> (Supervisor, SupervisorHandle) {
    build_with_audit(store, executor, config, None)
}

pub fn build_with_audit(
    store: &Arc<InMemoryStore>,
    executor: ScriptedExecutor,
    config: SupervisorConfig,
    audit: Option<Arc<dyn AuditSink>>,
) -> (Supervisor, SupervisorHandle) {
    let mut builder = SupervisorBuilder::new(config)
        .with_store(store.clone())
        .with_oracle(Arc::new(Every(3600)))
        .with_executor(executor);
    if let Some(audit) = audit {
        builder = builder.with_audit(audit);
    }
    builder.build().expect("supervisor builds")
}

/// Retry dispatch until `expected` tasks are running; workers park on the
/// rendezvous channel shortly after the pool starts.
pub async fn dispatch_until(sup: &mut Supervisor, now: DateTime<Utc>, expected: usize) {
    for _ in 0..200 {
        sup.dispatch_pending(now);
        if sup.run_queue().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} running tasks, have {} (scheduled {})",
        sup.run_queue().len(),
        sup.schedule_queue().len()
    );
}

/// Apply worker updates until the terminal one for `task` has been applied.
pub async fn settle(sup: &mut Supervisor, task: Uuid) -> Vec<WorkerUpdate> {
    let mut seen = Vec::new();
    loop {
        let update = tokio::time::timeout(Duration::from_secs(5), sup.next_update())
            .await
            .expect("worker update within 5s")
            .expect("update channel open");
        let done = update.is_terminal() && update.task() == task;
        sup.apply_update(update.clone());
        seen.push(update);
        if done {
            return seen;
        }
    }
}

/// Poll `check` until it holds, for up to five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}
