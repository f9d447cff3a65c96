//! Supervisor configuration.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of the environment variables read by [`SupervisorConfig::from_env`].
pub const ENV_PREFIX: &str = "SUPERVISOR_";

const DEFAULT_PURGE_AGENT: &str = "127.0.0.1:5444";
const DEFAULT_MAX_TIMEOUT_SECS: u64 = 12 * 60 * 60;
/// Upper bound on `max_timeout_secs`: ten years.
pub const MAX_TIMEOUT_LIMIT_SECS: u64 = 10 * 365 * 24 * 60 * 60;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;
const DEFAULT_REPLY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WORKER_STACK_SIZE: usize = 2 * 1024 * 1024;

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Scalar settings loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Agent address handed to purge tasks.
    pub purge_agent: String,
    /// Per-task deadline budget in seconds.
    pub max_timeout_secs: u64,
    /// Interval of the schedule/timeout/dispatch tick in milliseconds.
    pub tick_interval_ms: u64,
    /// Interval of the archive purge tick in seconds.
    pub purge_interval_secs: u64,
    /// How long callers wait for an adhoc reply, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Stack size of each worker thread in bytes.
    pub worker_stack_size: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            purge_agent: DEFAULT_PURGE_AGENT.to_string(),
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
        }
    }
}

impl SupervisorConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be greater than 0".into());
        }
        if self.purge_agent.trim().is_empty() {
            return Err("purge_agent must not be empty".into());
        }
        if self.max_timeout_secs == 0 {
            return Err("max_timeout_secs must be greater than 0".into());
        }
        if self.max_timeout_secs > MAX_TIMEOUT_LIMIT_SECS {
            return Err(format!("max_timeout_secs must be at most {MAX_TIMEOUT_LIMIT_SECS}"));
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.purge_interval_secs == 0 {
            return Err("purge_interval_secs must be greater than 0".into());
        }
        if self.reply_timeout_ms == 0 {
            return Err("reply_timeout_ms must be greater than 0".into());
        }
        if self.worker_stack_size < 64 * 1024 {
            return Err("worker_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then read `SUPERVISOR_*` variables over the defaults.
    ///
    /// # Errors
    ///
    /// Fails on unparseable values or an invalid result.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup, keyed by full variable name.
    ///
    /// # Errors
    ///
    /// Fails on unparseable values or an invalid result.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("WORKERS") {
            cfg.workers = v.trim().parse().context("SUPERVISOR_WORKERS")?;
        }
        if let Some(v) = var("PURGE_AGENT") {
            cfg.purge_agent = v;
        }
        if let Some(v) = var("MAX_TIMEOUT_SECS") {
            cfg.max_timeout_secs = v.trim().parse().context("SUPERVISOR_MAX_TIMEOUT_SECS")?;
        }
        if let Some(v) = var("TICK_INTERVAL_MS") {
            cfg.tick_interval_ms = v.trim().parse().context("SUPERVISOR_TICK_INTERVAL_MS")?;
        }
        if let Some(v) = var("PURGE_INTERVAL_SECS") {
            cfg.purge_interval_secs = v.trim().parse().context("SUPERVISOR_PURGE_INTERVAL_SECS")?;
        }
        if let Some(v) = var("REPLY_TIMEOUT_MS") {
            cfg.reply_timeout_ms = v.trim().parse().context("SUPERVISOR_REPLY_TIMEOUT_MS")?;
        }
        if let Some(v) = var("WORKER_STACK_SIZE") {
            cfg.worker_stack_size = v.trim().parse().context("SUPERVISOR_WORKER_STACK_SIZE")?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Deadline budget added to every scheduled task. Saturates instead of overflowing.
    #[must_use]
    pub fn max_timeout(&self) -> chrono::Duration {
        i64::try_from(self.max_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Fast tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Purge tick period.
    #[must_use]
    pub const fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Adhoc reply wait bound.
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}
