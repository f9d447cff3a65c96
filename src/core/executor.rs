//! Plugin executor abstraction run by workers.

use async_trait::async_trait;

use crate::core::{OutputSink, PipelineError, Task};

/// What a finished plugin pipeline left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Everything the pipeline wrote to stdout.
    pub stdout: String,
    /// Whether every stage exited successfully.
    pub success: bool,
}

impl PipelineOutput {
    /// Successful run with `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            success: true,
        }
    }

    /// Unsuccessful run with `stdout`.
    pub fn failed(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            success: false,
        }
    }
}

/// Runs the external plugin pipeline for one task.
///
/// Called from a worker thread with its own single-threaded runtime, so an
/// implementation may await process I/O freely without touching the
/// supervisor's runtime. Dropping the returned future must abandon the
/// pipeline; workers drop it when the task is canceled.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Echo;
///
/// #[async_trait]
/// impl PluginExecutor for Echo {
///     async fn run(&self, task: &Task, output: &OutputSink) -> Result<PipelineOutput, PipelineError> {
///         output.line(format!("running {}", task.op));
///         Ok(PipelineOutput::ok(r#"{"key":"abc"}"#))
///     }
/// }
/// ```
#[async_trait]
pub trait PluginExecutor: Send + Sync + Clone + 'static {
    /// Run the pipeline for `task`, relaying stderr lines through `output`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` when the pipeline cannot be started or its streams fail.
    async fn run(&self, task: &Task, output: &OutputSink) -> Result<PipelineOutput, PipelineError>;
}
