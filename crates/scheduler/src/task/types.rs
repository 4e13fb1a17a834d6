use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::offset;
use crate::config::{text, text_opt};
use crate::cron::CronExpr;
use crate::error::{Result, SchedulerError, TaskError};
use crate::stats::TaskStats;

/// What a task function resolves to.
pub type TaskResult = std::result::Result<serde_json::Value, TaskError>;

/// Task lifecycle state.
///
/// ```text
/// Pending ──add──▶ Scheduled ◀──────────────┐
///                    │  │ ▲                 │ next occurrence
///              pause │  │ └─ resume ─┐      │
///                    ▼  └─ due ──▶ Running ─┤
///                 Paused               │    └─▶ Completed / Failed
/// ```
/// Any registered state moves to `Removed` on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Paused,
    Completed,
    Failed,
    Removed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of schedule attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Interval,
    Cron,
    Delay,
    Once,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskType::Interval => "interval",
            TaskType::Cron => "cron",
            TaskType::Delay => "delay",
            TaskType::Once => "once",
        })
    }
}

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Schedule {
    /// Every fixed period, first fire one period after registration.
    Interval(#[serde(with = "text")] Duration),
    /// On each fire time of a six-field cron expression.
    Cron(#[serde(serialize_with = "cron_source")] CronExpr),
    /// Once, a fixed delay after registration.
    Delay(#[serde(with = "text")] Duration),
    /// Never automatically; only through manual runs.
    Once,
}

fn cron_source<S: Serializer>(expr: &CronExpr, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(expr.as_str())
}

impl Schedule {
    pub fn kind(&self) -> TaskType {
        match self {
            Schedule::Interval(_) => TaskType::Interval,
            Schedule::Cron(_) => TaskType::Cron,
            Schedule::Delay(_) => TaskType::Delay,
            Schedule::Once => TaskType::Once,
        }
    }

    /// Whether a scheduled run is followed by another occurrence.
    pub fn is_recurring(&self) -> bool {
        matches!(self, Schedule::Interval(_) | Schedule::Cron(_))
    }

    /// First due time for a task registered at `now`.
    pub(crate) fn first_due(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match self {
            Schedule::Interval(d) | Schedule::Delay(d) => {
                offset(now, *d).map(Some).ok_or_else(|| out_of_range(self.kind(), *d))
            }
            Schedule::Cron(expr) => expr.next_after(now).map(Some).ok_or_else(|| {
                SchedulerError::InvalidSchedule(format!("cron expression '{expr}' never fires"))
            }),
            Schedule::Once => Ok(None),
        }
    }

    /// Next occurrence after a scheduled run that was due at `due`.
    ///
    /// Intervals advance in whole periods from `due` to the first instant
    /// after `now`, so missed occurrences are skipped rather than replayed.
    pub(crate) fn next_after_run(
        &self,
        due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(every) => advance_interval(due, *every, now),
            Schedule::Cron(expr) => expr.next_after(now),
            Schedule::Delay(_) | Schedule::Once => None,
        }
    }

    /// Due time when resuming a paused task at `now`.
    ///
    /// `previous` is the due time that was pending when the task was paused.
    pub(crate) fn resume_due(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        match self {
            Schedule::Interval(every) => offset(now, *every)
                .map(Some)
                .ok_or_else(|| out_of_range(TaskType::Interval, *every)),
            Schedule::Cron(expr) => Ok(expr.next_after(now)),
            Schedule::Delay(_) => Ok(previous.map(|at| at.max(now))),
            Schedule::Once => Ok(None),
        }
    }
}

fn out_of_range(kind: TaskType, d: Duration) -> SchedulerError {
    SchedulerError::InvalidSchedule(format!("{kind} of {d:?} is out of range"))
}

/// `None` once the next period would fall off the timeline.
fn advance_interval(
    due: DateTime<Utc>,
    every: Duration,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let next = offset(due, every)?;
    if next > now {
        return Some(next);
    }
    let behind = (now - due).num_nanoseconds().unwrap_or(i64::MAX).max(0) as u128;
    let step_nanos = every.as_nanos().max(1);
    let periods = behind / step_nanos + 1;
    let skip = u64::try_from(periods * step_nanos).ok()?;
    offset(due, Duration::from_nanos(skip))
}

/// What happens to a recurring task once a scheduled run has used up all
/// of its attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExhaustedRetries {
    /// Keep the schedule; the next occurrence runs as usual.
    #[default]
    Continue,
    /// Mark the task `Failed` and stop scheduling it until resumed.
    Disable,
}

/// Per-task retry and timeout policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Extra attempts after a failed one. A run makes at most
    /// `1 + max_retries` attempts.
    #[serde(default)]
    pub max_retries: u32,

    /// Wait between a failed attempt and its retry.
    #[serde(default = "default_retry_interval", with = "text")]
    pub retry_interval: Duration,

    /// Bound on a single attempt. `None` = unbounded.
    #[serde(default, with = "text_opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub on_exhausted_retries: OnExhaustedRetries,
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_interval: default_retry_interval(),
            timeout: None,
            on_exhausted_retries: OnExhaustedRetries::Continue,
        }
    }
}

impl TaskConfig {
    pub fn with_retries(mut self, max_retries: u32, retry_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_on_exhausted_retries(mut self, policy: OnExhaustedRetries) -> Self {
        self.on_exhausted_retries = policy;
        self
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A due occurrence of the task's schedule.
    Scheduled,
    /// `run_task_once`.
    Manual,
}

/// Handed to the task function on every attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    /// Shared by every attempt of one run.
    pub run_id: Uuid,
    /// 1-based attempt number within the run.
    pub attempt: u32,
    pub trigger: Trigger,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: String,
        run_id: Uuid,
        attempt: u32,
        trigger: Trigger,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            run_id,
            attempt,
            trigger,
            cancel,
        }
    }

    /// Cancelled when the attempt times out or shutdown abandons it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the attempt has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Point-in-time copy of a task's observable fields.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub task_type: Option<TaskType>,
    pub schedule: Option<Schedule>,
    pub status: TaskStatus,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub config: TaskConfig,
    pub stats: TaskStats,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn interval_next_is_one_period_after_due() {
        let s = Schedule::Interval(Duration::from_secs(60));
        let next = s.next_after_run(at(10, 0, 0), at(10, 0, 5));
        assert_eq!(next, Some(at(10, 1, 0)));
    }

    #[test]
    fn interval_skips_missed_periods() {
        let s = Schedule::Interval(Duration::from_secs(60));
        // Run overran by three and a half periods.
        let next = s.next_after_run(at(10, 0, 0), at(10, 3, 30));
        assert_eq!(next, Some(at(10, 4, 0)));
    }

    #[test]
    fn interval_on_exact_boundary_moves_past_now() {
        let s = Schedule::Interval(Duration::from_secs(60));
        let next = s.next_after_run(at(10, 0, 0), at(10, 2, 0));
        assert_eq!(next, Some(at(10, 3, 0)));
    }

    #[test]
    fn one_shot_schedules_have_no_next() {
        assert_eq!(
            Schedule::Delay(Duration::from_secs(1)).next_after_run(at(1, 0, 0), at(1, 0, 1)),
            None
        );
        assert_eq!(Schedule::Once.first_due(at(1, 0, 0)).unwrap(), None);
    }

    #[test]
    fn resume_delay_keeps_future_due_time() {
        let s = Schedule::Delay(Duration::from_secs(600));
        assert_eq!(
            s.resume_due(Some(at(12, 0, 0)), at(11, 0, 0)).unwrap(),
            Some(at(12, 0, 0))
        );
        assert_eq!(
            s.resume_due(Some(at(10, 0, 0)), at(11, 0, 0)).unwrap(),
            Some(at(11, 0, 0))
        );
    }

    #[test]
    fn resume_interval_restarts_period() {
        let s = Schedule::Interval(Duration::from_secs(30));
        assert_eq!(
            s.resume_due(Some(at(9, 0, 0)), at(11, 0, 0)).unwrap(),
            Some(at(11, 0, 30))
        );
    }

    #[test]
    fn durations_past_the_timeline_are_invalid() {
        let huge = Duration::from_secs(u64::MAX);
        let err = Schedule::Interval(huge).first_due(at(1, 0, 0)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        assert!(Schedule::Delay(huge).first_due(at(1, 0, 0)).is_err());
        assert!(Schedule::Interval(huge)
            .resume_due(None, at(1, 0, 0))
            .is_err());

        let late = DateTime::<Utc>::MAX_UTC - chrono::Duration::seconds(30);
        let s = Schedule::Interval(Duration::from_secs(60));
        assert_eq!(s.next_after_run(late, late), None);
    }

    #[test]
    fn task_config_from_toml() {
        let cfg: TaskConfig = toml::from_str(
            r#"
            max_retries = 3
            retry_interval = "250ms"
            timeout = "10s"
            on_exhausted_retries = "disable"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_interval, Duration::from_millis(250));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(10)));
        assert_eq!(cfg.on_exhausted_retries, OnExhaustedRetries::Disable);
    }

    #[test]
    fn task_config_defaults() {
        let cfg: TaskConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, TaskConfig::default());
        assert_eq!(cfg.timeout, None);
    }

    #[test]
    fn schedule_serializes_with_kind() {
        let json = serde_json::to_value(Schedule::Interval(Duration::from_secs(90))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "interval", "value": "1m30s"}));

        let cron = Schedule::Cron(CronExpr::parse("0 0 * * * *").unwrap());
        let json = serde_json::to_value(cron).unwrap();
        assert_eq!(json["value"], "0 0 * * * *");
    }
}
