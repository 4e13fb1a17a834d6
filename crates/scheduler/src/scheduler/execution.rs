use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::core::Shared;
use super::due::EntryKind;
use crate::clock::offset;
use crate::error::TaskError;
use crate::event::TaskEvent;
use crate::pool::PoolJob;
use crate::sync::panic_message;
use crate::task::state::{PendingAttempt, TaskState};
use crate::task::{
    OnExhaustedRetries, Schedule, Task, TaskConfig, TaskContext, TaskResult, TaskStatus, Trigger,
};

/// One attempt of one run, as submitted to the worker pool.
pub(crate) struct RunJob {
    shared: Weak<Shared>,
    task: Task,
    run_id: Uuid,
    trigger: Trigger,
    attempt: u32,
    cancel: CancellationToken,
}

impl PoolJob for RunJob {
    fn run(self) -> BoxFuture<'static, ()> {
        self.execute().boxed()
    }

    fn abandon(self) {
        let mut st = self.task.state();
        if st.active.is_some_and(|run| run.run_id == self.run_id) {
            st.abort_run();
            debug!(
                "Abandoned queued attempt {} of task {} at shutdown",
                self.attempt,
                self.task.id()
            );
        }
    }
}

impl Shared {
    /// Submit the next attempt of the task's active run.
    ///
    /// Returns `false` when the pool is saturated; the caller keeps the
    /// attempt due.
    pub(super) fn launch(self: &Arc<Self>, task: &Task, st: &TaskState, attempt: u32) -> bool {
        let Some(run) = st.active else {
            return false;
        };
        let job = RunJob {
            shared: Arc::downgrade(self),
            task: task.clone(),
            run_id: run.run_id,
            trigger: run.trigger,
            attempt,
            cancel: self.run_token().child_token(),
        };
        match self.pool.try_submit(job) {
            Ok(()) => {
                debug!(
                    "Submitted attempt {} of task {} ({:?})",
                    attempt,
                    task.id(),
                    run.trigger
                );
                true
            }
            Err(_) => false,
        }
    }

    /// Park the next attempt of the active run in the due index.
    pub(super) fn park_attempt(&self, task: &Task, st: &mut TaskState, pending: PendingAttempt) {
        st.attempt_gen += 1;
        st.pending = Some(pending);
        self.push_due(task.id(), pending.at, st.seq, EntryKind::Attempt, st.attempt_gen);
    }

    /// Give up every run that is waiting between attempts, restoring the
    /// status its task held before the run. Returns how many were dropped.
    pub(super) fn abandon_parked(&self) -> usize {
        let mut abandoned = 0;
        for task in self.registry().values() {
            let mut st = task.state();
            if st.active.is_some() && st.pending.is_some() {
                st.abort_run();
                abandoned += 1;
                debug!("Abandoned parked run of task {} at shutdown", task.id());
            }
        }
        abandoned
    }
}

impl RunJob {
    async fn execute(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let started_at = shared.clock.now();
        {
            let mut st = self.task.state();
            if st.status == TaskStatus::Removed {
                debug!("Skipping attempt of removed task {}", self.task.id());
                return;
            }
            st.last_run_at = Some(started_at);
        }

        let timeout = self.task.config().timeout;
        let ctx = TaskContext::new(
            self.task.id().to_string(),
            self.run_id,
            self.attempt,
            self.trigger,
            self.cancel.clone(),
        );
        let func = self.task.func();
        let cancel = self.cancel.clone();

        let start = Instant::now();
        let attempt = AssertUnwindSafe(async move {
            let fut = func(ctx);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        cancel.cancel();
                        Err(TaskError::Timeout(limit))
                    }
                },
                None => fut.await,
            }
        });
        let outcome = attempt
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic.as_ref()))));
        let duration = start.elapsed();

        shared.settle(&self, outcome, duration);
    }
}

impl Shared {
    /// Record a finished attempt and move the task to its next state.
    fn settle(&self, job: &RunJob, outcome: TaskResult, duration: Duration) {
        let task = &job.task;
        if !self.is_registered(task) {
            debug!(
                "Task {} was removed during execution; discarding result",
                task.id()
            );
            return;
        }

        let now = self.clock.now();
        let config = task.config();
        let settled = {
            let mut st = task.state();
            if st.status == TaskStatus::Removed
                || !st.active.is_some_and(|run| run.run_id == job.run_id)
            {
                return;
            }
            st.stats
                .record_attempt(duration, outcome.as_ref().err().map(ToString::to_string));

            let retry_at = match &outcome {
                Err(_) if job.attempt <= config.max_retries => {
                    let at = offset(now, config.retry_interval);
                    if at.is_none() {
                        error!(
                            "Task {} retry interval {:?} is out of range; giving up the run",
                            task.id(),
                            config.retry_interval
                        );
                    }
                    at
                }
                _ => None,
            };

            match (&outcome, retry_at) {
                (Err(e), Some(at)) => {
                    warn!(
                        "Task {} attempt {}/{} failed: {}; retrying in {:?}",
                        task.id(),
                        job.attempt,
                        config.max_retries + 1,
                        e,
                        config.retry_interval
                    );
                    let pending = PendingAttempt {
                        at,
                        attempt: job.attempt + 1,
                    };
                    self.park_attempt(task, &mut st, pending);
                    false
                }
                _ => {
                    self.finish_run(task, &mut st, job, outcome.is_ok(), &config, now);
                    true
                }
            }
        };

        match &outcome {
            Ok(_) => debug!(
                "Task {} attempt {} succeeded in {:?}",
                task.id(),
                job.attempt,
                duration
            ),
            Err(e) if settled => warn!(
                "Task {} failed after {} attempt(s): {}",
                task.id(),
                job.attempt,
                e
            ),
            Err(_) => {}
        }

        if let Some(callback) = task.callback() {
            let call = std::panic::catch_unwind(AssertUnwindSafe(|| callback(task.id(), &outcome)));
            if let Err(panic) = call {
                error!(
                    "Callback of task {} panicked: {}",
                    task.id(),
                    panic_message(panic.as_ref())
                );
            }
        }

        // No receivers is fine.
        let _ = self.events.send(TaskEvent {
            task_id: task.id().to_string(),
            run_id: job.run_id,
            attempt: job.attempt,
            trigger: job.trigger,
            outcome,
            duration,
            finished_at: now,
            settled,
        });
    }

    fn finish_run(
        &self,
        task: &Task,
        st: &mut TaskState,
        job: &RunJob,
        success: bool,
        config: &TaskConfig,
        now: DateTime<Utc>,
    ) {
        let Some(run) = st.active.take() else {
            return;
        };
        if st.pending.take().is_some() {
            st.attempt_gen += 1;
        }
        let Some(schedule) = task.schedule() else {
            st.status = run.restore;
            return;
        };
        let terminal = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        match (job.trigger, &schedule) {
            (Trigger::Manual, Schedule::Once) => {
                st.status = terminal;
                st.next_run_at = None;
            }
            (Trigger::Manual, _) => {
                // The schedule was left untouched by the manual run.
                st.status = run.restore;
            }
            (Trigger::Scheduled, recurring) if recurring.is_recurring() => {
                st.schedule_gen += 1;
                if !success && config.on_exhausted_retries == OnExhaustedRetries::Disable {
                    warn!(
                        "Task {} disabled after exhausting {} retries",
                        task.id(),
                        config.max_retries
                    );
                    st.status = TaskStatus::Failed;
                    st.disabled = true;
                    st.next_run_at = None;
                    return;
                }
                let due = st.next_run_at.unwrap_or(now);
                st.next_run_at = recurring.next_after_run(due, now);
                match st.next_run_at {
                    Some(at) => {
                        st.status = TaskStatus::Scheduled;
                        self.push_due(task.id(), at, st.seq, EntryKind::Occurrence, st.schedule_gen);
                    }
                    None => {
                        info!("Task {} has no further occurrences", task.id());
                        st.status = terminal;
                    }
                }
            }
            (Trigger::Scheduled, _) => {
                st.status = terminal;
                st.next_run_at = None;
            }
        }
    }
}
