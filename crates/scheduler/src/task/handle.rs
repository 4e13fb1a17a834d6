use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::state::TaskState;
use super::{Schedule, TaskConfig, TaskContext, TaskResult, TaskStatus, TaskType, TaskView};
use crate::clock;
use crate::cron::CronExpr;
use crate::error::{Result, SchedulerError};
use crate::stats::TaskStats;
use crate::sync;

pub(crate) type TaskFn = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, TaskResult> + Send + Sync>;
pub(crate) type TaskCallback = Arc<dyn Fn(&str, &TaskResult) + Send + Sync>;

/// A unit of work plus its schedule, policy and live state.
///
/// `Task` is a handle: clones share the same task, so the value passed to
/// [`Scheduler::add_task`](crate::Scheduler::add_task) can still be queried
/// afterwards. The schedule can be set exactly once.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: String,
    name: String,
    func: TaskFn,
    schedule: OnceLock<Schedule>,
    config: RwLock<TaskConfig>,
    callback: RwLock<Option<TaskCallback>>,
    state: Mutex<TaskState>,
}

impl Task {
    /// Create a task in `Pending` state with no schedule.
    pub fn new<F, Fut>(id: impl Into<String>, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let func: TaskFn = Arc::new(move |ctx| func(ctx).boxed());
        Self {
            inner: Arc::new(TaskInner {
                id: id.into(),
                name: name.into(),
                func,
                schedule: OnceLock::new(),
                config: RwLock::new(TaskConfig::default()),
                callback: RwLock::new(None),
                state: Mutex::new(TaskState::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fire every `every`, starting one period after registration.
    pub fn set_interval(&self, every: Duration) -> Result<()> {
        if every.is_zero() {
            return Err(SchedulerError::InvalidSchedule(format!(
                "task {}: interval must be positive",
                self.id()
            )));
        }
        if !clock::fits_timeline(every) {
            return Err(SchedulerError::InvalidSchedule(format!(
                "task {}: interval of {:?} is out of range",
                self.id(),
                every
            )));
        }
        self.set_schedule(Schedule::Interval(every))
    }

    /// Fire on each time matched by a six-field cron expression.
    pub fn set_cron(&self, expr: &str) -> Result<()> {
        let cron = CronExpr::parse(expr)?;
        self.set_schedule(Schedule::Cron(cron))
    }

    /// Fire once, `delay` after registration.
    pub fn set_delay(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Err(SchedulerError::InvalidSchedule(format!(
                "task {}: delay must be positive",
                self.id()
            )));
        }
        if !clock::fits_timeline(delay) {
            return Err(SchedulerError::InvalidSchedule(format!(
                "task {}: delay of {:?} is out of range",
                self.id(),
                delay
            )));
        }
        self.set_schedule(Schedule::Delay(delay))
    }

    /// Never fire automatically; run only through `run_task_once`.
    pub fn set_once(&self) -> Result<()> {
        self.set_schedule(Schedule::Once)
    }

    fn set_schedule(&self, schedule: Schedule) -> Result<()> {
        let kind = schedule.kind();
        self.inner.schedule.set(schedule).map_err(|_| {
            let current = self.task_type().unwrap_or(kind);
            SchedulerError::InvalidSchedule(format!(
                "task {}: already has a {current} schedule, cannot set {kind}",
                self.id()
            ))
        })
    }

    /// Register a function invoked after every attempt with the attempt's
    /// outcome. Replaces any previous callback.
    pub fn set_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&str, &TaskResult) + Send + Sync + 'static,
    {
        let status = self.status();
        if status == TaskStatus::Running {
            return Err(SchedulerError::InvalidState {
                id: self.id().to_string(),
                status,
                op: "replace the callback of",
            });
        }
        let callback: TaskCallback = Arc::new(callback);
        *sync::write(&self.inner.callback, "task callback") = Some(callback);
        Ok(())
    }

    /// Replace the retry and timeout policy. Only allowed before registration;
    /// durations too large to schedule are rejected.
    pub fn set_config(&self, config: TaskConfig) -> Result<()> {
        let status = self.status();
        if status != TaskStatus::Pending {
            return Err(SchedulerError::InvalidState {
                id: self.id().to_string(),
                status,
                op: "configure",
            });
        }
        let durations = [
            ("retry_interval", Some(config.retry_interval)),
            ("timeout", config.timeout),
        ];
        for (field, value) in durations {
            if let Some(d) = value.filter(|d| !clock::fits_timeline(*d)) {
                return Err(SchedulerError::Config(format!(
                    "task {}: {field} of {d:?} is out of range",
                    self.id()
                )));
            }
        }
        *sync::write(&self.inner.config, "task config") = config;
        Ok(())
    }

    pub fn schedule(&self) -> Option<Schedule> {
        self.inner.schedule.get().cloned()
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.inner.schedule.get().map(Schedule::kind)
    }

    pub fn config(&self) -> TaskConfig {
        sync::read(&self.inner.config, "task config").clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.state().status
    }

    pub fn stats(&self) -> TaskStats {
        self.state().stats.clone()
    }

    pub fn view(&self) -> TaskView {
        let config = self.config();
        let st = self.state();
        TaskView {
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            task_type: self.task_type(),
            schedule: self.schedule(),
            status: st.status,
            next_run_at: st.next_run_at,
            last_run_at: st.last_run_at,
            config,
            stats: st.stats.clone(),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, TaskState> {
        sync::lock(&self.inner.state, "task state")
    }

    pub(crate) fn func(&self) -> TaskFn {
        Arc::clone(&self.inner.func)
    }

    pub(crate) fn callback(&self) -> Option<TaskCallback> {
        sync::read(&self.inner.callback, "task callback").clone()
    }

    /// Whether both handles refer to the same task.
    pub fn same_task(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("schedule", &self.inner.schedule.get())
            .finish_non_exhaustive()
    }
}
