//! Task definitions: schedules, per-task configuration and the shared handle.

mod handle;
pub(crate) mod state;
mod types;

pub use handle::Task;
pub(crate) use handle::{TaskCallback, TaskFn};
pub use types::{
    OnExhaustedRetries, Schedule, TaskConfig, TaskContext, TaskResult, TaskStatus, TaskType,
    TaskView, Trigger,
};
