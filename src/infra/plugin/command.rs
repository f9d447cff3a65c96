//! Plugin executor that shells out to a pipeline program.
//!
//! The program receives the task through `PIPELINE_*` environment variables,
//! writes progress to stderr (relayed line by line) and its result to stdout.
//! For backups stdout must be a JSON object carrying the restore key:
//! `{"key": "..."}`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::core::{OutputSink, PipelineError, PipelineOutput, PluginExecutor, Task};

/// Runs a pipeline program per task. The child is killed if the run is abandoned.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandPipeline {
    /// Pipeline running `program` with no extra arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append arguments passed to every run.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a fixed environment variable passed to every run.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Environment describing `task` to the pipeline program.
    #[must_use]
    pub fn environment(task: &Task) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("PIPELINE_OP", task.op.as_str().to_string()),
            ("PIPELINE_TASK", task.uuid.to_string()),
            ("PIPELINE_AGENT", task.agent.clone()),
        ];
        if let Some(target) = &task.target {
            env.push(("PIPELINE_TARGET_PLUGIN", target.plugin.clone()));
            env.push(("PIPELINE_TARGET_ENDPOINT", target.endpoint.to_string()));
        }
        if let Some(store) = &task.store {
            env.push(("PIPELINE_STORE_PLUGIN", store.plugin.clone()));
            env.push(("PIPELINE_STORE_ENDPOINT", store.endpoint.to_string()));
        }
        if let Some(key) = &task.restore_key {
            env.push(("PIPELINE_RESTORE_KEY", key.clone()));
        }
        env
    }
}

#[async_trait]
impl PluginExecutor for CommandPipeline {
    async fn run(&self, task: &Task, output: &OutputSink) -> Result<PipelineOutput, PipelineError> {
        if task.agent.trim().is_empty() {
            return Err(PipelineError::NoAgent(task.uuid));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(Self::environment(task))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!(task_id = %task.uuid, program = %self.program.display(), pid = ?child.id(), "pipeline started");

        let stderr = child.stderr.take();
        let stdout = child.stdout.take();

        let relay = async {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Some(line) = lines.next_line().await? {
                    output.line(line);
                }
            }
            Ok::<(), std::io::Error>(())
        };
        let collect = async {
            let mut buf = String::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_string(&mut buf).await?;
            }
            Ok::<String, std::io::Error>(buf)
        };

        let (relayed, collected) = tokio::join!(relay, collect);
        relayed?;
        let stdout = collected?;
        let status = child.wait().await?;
        debug!(task_id = %task.uuid, status = %status, "pipeline exited");

        Ok(PipelineOutput {
            stdout,
            success: status.success(),
        })
    }
}
