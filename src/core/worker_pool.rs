//! Fixed-size worker pool running plugin pipelines on dedicated OS threads.
//!
//! Each worker owns a single-threaded tokio runtime and blocks on a shared
//! rendezvous channel, so a non-blocking dispatch succeeds only when some
//! worker is idle and waiting. Workers report everything through the update
//! channel and hold no scheduling state of their own.
//!
//! # Example
//!
//! ```rust,ignore
//! let (updates_tx, updates_rx) = tokio::sync::mpsc::unbounded_channel();
//! let pool = WorkerPool::new(&config, CommandPipeline::new("shield-pipe"), updates_tx)?;
//!
//! let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//! match pool.try_dispatch(task, cancel_rx) {
//!     Ok(()) => { /* track in the run queue with cancel_tx */ }
//!     Err(PoolError::Busy) => { /* try again next tick */ }
//!     Err(e) => return Err(e),
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::core::{
    Operation, OutputSink, PipelineError, PipelineOutput, PluginExecutor, Task, UpdateSender,
    WorkerUpdate,
};

/// How long shutdown waits for each worker thread to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors returned by the worker pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No worker is idle right now.
    #[error("no idle worker")]
    Busy,
    /// The pool has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be started.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Pool utilization snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Workers currently running a pipeline.
    pub active_tasks: u64,
    /// Tasks handed to a worker since start.
    pub dispatched_tasks: u64,
    /// Tasks whose terminal update was `Stopped`.
    pub completed_tasks: u64,
    /// Tasks whose terminal update was `Failed`.
    pub failed_tasks: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub dispatched_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
}

impl PoolCounters {
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            dispatched_tasks: self.dispatched_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }
}

/// A task handed to a worker together with its cancel signal.
#[derive(Debug)]
pub struct DispatchedTask {
    /// Task to run.
    pub task: Task,
    /// Flips to `true` when the supervisor gives up on the task.
    pub cancel: watch::Receiver<bool>,
}

/// Bounded pool of plugin workers.
pub struct WorkerPool {
    worker_count: usize,
    task_tx: Mutex<Option<Sender<DispatchedTask>>>,
    counters: Arc<PoolCounters>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.workers` worker threads running `executor`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` for an invalid configuration and
    /// `PoolError::Internal` if a thread cannot be spawned.
    pub fn new<E: PluginExecutor>(
        config: &SupervisorConfig,
        executor: E,
        updates: UpdateSender,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        // zero capacity: a send only completes when a worker is waiting in recv
        let (task_tx, task_rx) = bounded::<DispatchedTask>(0);
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let handle = spawn_worker(
                worker_id,
                task_rx.clone(),
                updates.clone(),
                Arc::clone(&counters),
                executor.clone(),
                config.worker_stack_size,
            )
            .map_err(|e| PoolError::Internal(format!("failed to spawn worker {worker_id}: {e}")))?;
            workers.push(handle);
        }

        info!(worker_count = config.workers, "worker pool started");

        Ok(Self {
            worker_count: config.workers,
            task_tx: Mutex::new(Some(task_tx)),
            counters,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(workers),
        })
    }

    /// Hand `task` to an idle worker without blocking.
    ///
    /// # Errors
    ///
    /// - `PoolError::Busy` if every worker is occupied
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    pub fn try_dispatch(&self, task: Task, cancel: watch::Receiver<bool>) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        let guard = self.task_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };

        let task_id = task.uuid;
        match tx.try_send(DispatchedTask { task, cancel }) {
            Ok(()) => {
                self.counters.dispatched_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task_id, "task dispatched to worker");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(PoolError::Busy),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::PoolShutdown),
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Current utilization.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.worker_count)
    }

    /// Stop accepting work and join the workers, waiting a bounded time for each.
    ///
    /// Workers still inside a pipeline past the wait are detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down worker pool");

        // idle workers see a disconnected channel and exit
        *self.task_tx.lock() = None;

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(true) => debug!(worker_id = idx, "worker joined"),
                Ok(false) => warn!(worker_id = idx, "worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "worker did not exit within timeout, detaching");
                    continue;
                }
            }
            let _ = joiner.join();
        }
        info!(worker_count, "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.task_tx.lock() = None;
            debug!("worker pool dropped without shutdown; workers detached");
        }
    }
}

fn spawn_worker<E: PluginExecutor>(
    worker_id: usize,
    task_rx: Receiver<DispatchedTask>,
    updates: UpdateSender,
    counters: Arc<PoolCounters>,
    executor: E,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("backup-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to create worker runtime");
                    return;
                }
            };

            while let Ok(dispatched) = task_rx.recv() {
                counters.active_tasks.fetch_add(1, Ordering::Relaxed);
                let task_id = dispatched.task.uuid;
                debug!(worker_id, task_id = %task_id, op = %dispatched.task.op, "worker picked up task");

                let stopped = rt.block_on(run_task(&executor, dispatched, &updates));

                counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                if stopped {
                    counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }
                debug!(worker_id, task_id = %task_id, stopped, "worker finished task");
            }
            debug!(worker_id, "worker channel closed, exiting");
        })
}

/// Run one task to its single terminal update. Returns `true` for `Stopped`.
async fn run_task<E: PluginExecutor>(executor: &E, dispatched: DispatchedTask, updates: &UpdateSender) -> bool {
    let DispatchedTask { task, mut cancel } = dispatched;
    let sink = OutputSink::new(task.uuid, updates.clone());

    let result = tokio::select! {
        result = executor.run(&task, &sink) => result,
        () = canceled(&mut cancel) => Err(PipelineError::Canceled),
    };

    let stopped = report(&task, result, &sink);
    let at = Utc::now();
    sink.send(if stopped {
        WorkerUpdate::Stopped { task: task.uuid, at }
    } else {
        WorkerUpdate::Failed { task: task.uuid, at }
    });
    stopped
}

async fn canceled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|canceled| *canceled).await.is_err() {
        // supervisor dropped the signal without firing it; run to completion
        std::future::pending::<()>().await;
    }
}

#[derive(Deserialize)]
struct BackupOutput {
    key: String,
}

fn restore_key(stdout: &str) -> Option<String> {
    serde_json::from_str::<BackupOutput>(stdout.trim())
        .ok()
        .map(|out| out.key)
        .filter(|key| !key.is_empty())
}

/// Emit the non-terminal updates for a finished pipeline and decide its outcome.
fn report(task: &Task, result: Result<PipelineOutput, PipelineError>, sink: &OutputSink) -> bool {
    let output = match result {
        Ok(output) => output,
        Err(PipelineError::Canceled) => {
            sink.line("TASK CANCELED: deadline exceeded");
            return false;
        }
        Err(e) => {
            sink.line(format!("TASK FAILED!! {e}"));
            return false;
        }
    };

    match task.op {
        Operation::Backup => {
            let Some(key) = restore_key(&output.stdout) else {
                sink.line("TASK FAILED!! pipeline produced no restore key");
                return false;
            };
            sink.send(WorkerUpdate::RestoreKey {
                task: task.uuid,
                key,
                at: Utc::now(),
                ok: output.success,
            });
            output.success
        }
        Operation::Restore => {
            for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
                sink.line(line);
            }
            output.success
        }
        Operation::Purge => {
            if !output.success {
                return false;
            }
            if let Some(archive) = task.archive_uuid {
                sink.send(WorkerUpdate::PurgeArchive {
                    task: task.uuid,
                    archive,
                });
            }
            true
        }
    }
}
