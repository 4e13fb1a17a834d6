use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskStatus;

/// Errors returned synchronously by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("cannot {op} task {id} while it is {status}")]
    InvalidState {
        id: String,
        status: TaskStatus,
        op: &'static str,
    },

    #[error("task already running: {0}")]
    AlreadyRunning(String),

    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("scheduler not started")]
    NotStarted,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Outcome of a failed task-function attempt.
///
/// Never returned to the caller of `add_task`/`run_task_once`; it only
/// reaches callbacks, [`TaskEvent`](crate::TaskEvent)s and stats.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    #[error("task cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        Self::Failed(msg.to_string())
    }
}

impl From<String> for TaskError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for TaskError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}
