//! Assemble a supervisor and its handle from configuration and collaborators.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use crate::config::SupervisorConfig;
use crate::core::handle::HandleParts;
use crate::core::supervisor::SupervisorParts;
use crate::core::{
    AppResult, AuditSink, PluginExecutor, ScheduleOracle, Store, Supervisor, SupervisorHandle,
    SupervisorStatus, WorkerPool,
};

/// Adhoc requests buffered before submitters wait on the supervisor.
pub const ADHOC_BUFFER: usize = 64;

/// Builder for a [`Supervisor`] and the [`SupervisorHandle`] driving it.
///
/// ```rust,ignore
/// let (supervisor, handle) = SupervisorBuilder::new(SupervisorConfig::from_env()?)
///     .with_store(Arc::new(InMemoryStore::new()))
///     .with_oracle(Arc::new(my_oracle))
///     .with_executor(CommandPipeline::new("shield-pipe"))
///     .build()?;
/// tokio::spawn(supervisor.run());
/// handle.resync()?;
/// ```
pub struct SupervisorBuilder<E> {
    config: SupervisorConfig,
    store: Option<Arc<dyn Store>>,
    oracle: Option<Arc<dyn ScheduleOracle>>,
    executor: Option<E>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<E: PluginExecutor> SupervisorBuilder<E> {
    /// Start from a configuration.
    #[must_use]
    pub const fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            store: None,
            oracle: None,
            executor: None,
            audit: None,
        }
    }

    /// Durable store. Required.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Schedule oracle. Required.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn ScheduleOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Plugin executor run by every worker. Required.
    #[must_use]
    pub fn with_executor(mut self, executor: E) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Audit sink for lifecycle transitions.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validate the configuration, start the worker pool and wire the channels.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, a missing collaborator, or a worker
    /// thread that cannot be started.
    pub fn build(self) -> AppResult<(Supervisor, SupervisorHandle)> {
        self.config
            .validate()
            .map_err(|e| anyhow!("config invalid: {e}"))?;
        let store = self.store.ok_or_else(|| anyhow!("a store is required"))?;
        let oracle = self.oracle.ok_or_else(|| anyhow!("a schedule oracle is required"))?;
        let executor = self.executor.ok_or_else(|| anyhow!("a plugin executor is required"))?;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (resync_tx, resync_rx) = mpsc::channel(1);
        let (adhoc_tx, adhoc_rx) = mpsc::channel(ADHOC_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = Arc::new(RwLock::new(SupervisorStatus::default()));

        let pool = WorkerPool::new(&self.config, executor, updates_tx).context("failed to start worker pool")?;

        let handle = SupervisorHandle::new(HandleParts {
            resync_tx,
            adhoc_tx,
            shutdown_tx,
            status: Arc::clone(&status),
            reply_timeout: self.config.reply_timeout(),
        });
        let supervisor = Supervisor::new(SupervisorParts {
            config: self.config,
            store,
            oracle,
            pool,
            audit: self.audit,
            updates_rx,
            resync_rx,
            adhoc_rx,
            shutdown_rx,
            status,
        });
        Ok((supervisor, handle))
    }
}
