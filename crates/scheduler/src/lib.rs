//! In-process task scheduler.
//!
//! This crate provides:
//! - Interval, cron, one-shot delay and run-on-demand schedules
//! - A bounded worker pool with a non-blocking submit path and backpressure
//! - Per-task retry and timeout policy
//! - Pause/resume, manual runs and per-task statistics
//! - Graceful shutdown with a grace period

mod clock;
pub mod config;
pub mod cron;
pub mod error;
pub mod event;
mod pool;
pub mod scheduler;
pub mod stats;
mod sync;
pub mod task;

pub use config::{format_duration, parse_duration, LogLevel, SchedulerConfig};
pub use self::cron::{next_fire_time, CronExpr};
pub use error::{Result, SchedulerError, TaskError};
pub use event::TaskEvent;
pub use scheduler::Scheduler;
pub use stats::{PoolSnapshot, SchedulerStats, TaskStats};
pub use task::{
    OnExhaustedRetries, Schedule, Task, TaskConfig, TaskContext, TaskResult, TaskStatus, TaskType,
    TaskView, Trigger,
};
