use std::process::Stdio;
use std::sync::Arc;

use serde_json::json;
use tokio::process::Command;
use tracing::debug;

use tickwork_scheduler::{TaskContext, TaskError, TaskResult};

/// Longest stderr excerpt carried in a failure message.
const STDERR_EXCERPT: usize = 512;

/// An external command run as a task function.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: Arc<str>,
    args: Arc<[String]>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: Arc::from(program),
            args: Arc::from(args),
        }
    }

    /// Run the command to completion.
    ///
    /// Exit code zero yields `{"status": 0, "stdout": ...}`; anything else,
    /// a spawn error or cancellation is a failed attempt. A cancelled attempt
    /// kills the child.
    pub async fn run(&self, ctx: TaskContext) -> TaskResult {
        debug!(
            task = %ctx.task_id,
            attempt = ctx.attempt,
            program = %self.program,
            "Spawning command"
        );
        let mut command = Command::new(self.program.as_ref());
        command
            .args(self.args.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            out = command.output() => out.map_err(|e| {
                TaskError::failed(format!("failed to spawn '{}': {e}", self.program))
            })?,
            _ = ctx.cancelled() => return Err(TaskError::Cancelled),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if output.status.success() {
            return Ok(json!({
                "status": output.status.code(),
                "stdout": stdout,
            }));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
        let status = match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        if excerpt.is_empty() {
            Err(TaskError::failed(format!("'{}' failed with {status}", self.program)))
        } else {
            Err(TaskError::failed(format!(
                "'{}' failed with {status}: {excerpt}",
                self.program
            )))
        }
    }
}
