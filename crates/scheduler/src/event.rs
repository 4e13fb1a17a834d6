//! Per-attempt notifications published by the scheduler.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::task::{TaskResult, Trigger};

/// Published after every attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub run_id: Uuid,
    pub attempt: u32,
    pub trigger: Trigger,
    pub outcome: TaskResult,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
    /// `false` when another attempt of the same run follows.
    pub settled: bool,
}

impl TaskEvent {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
