use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{TaskStatus, Trigger};
use crate::stats::TaskStats;

/// Mutable part of a task, guarded by the task's own mutex.
#[derive(Debug)]
pub(crate) struct TaskState {
    pub status: TaskStatus,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub stats: TaskStats,
    /// Registration order; also tells apart tasks that reuse an id.
    pub seq: u64,
    /// Bumped whenever `next_run_at` is replaced or withdrawn.
    pub schedule_gen: u64,
    /// Bumped whenever `pending` is replaced or withdrawn.
    pub attempt_gen: u64,
    /// The run currently executing or waiting for its next attempt.
    pub active: Option<ActiveRun>,
    /// Next attempt of `active`, waiting for its due time or a free worker.
    pub pending: Option<PendingAttempt>,
    /// Set when a recurring task was disabled after exhausting its retries.
    pub disabled: bool,
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            next_run_at: None,
            last_run_at: None,
            stats: TaskStats::default(),
            seq: 0,
            schedule_gen: 0,
            attempt_gen: 0,
            active: None,
            pending: None,
            disabled: false,
        }
    }

    /// Enter `Running` for a fresh run, remembering where to return to.
    pub fn begin_run(&mut self, trigger: Trigger) -> Uuid {
        let run_id = Uuid::new_v4();
        self.active = Some(ActiveRun {
            run_id,
            trigger,
            restore: self.status,
        });
        self.status = TaskStatus::Running;
        run_id
    }

    /// Undo `begin_run` for a run that never executed.
    pub fn abort_run(&mut self) {
        if let Some(run) = self.active.take() {
            self.status = run.restore;
        }
        if self.pending.take().is_some() {
            self.attempt_gen += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveRun {
    pub run_id: Uuid,
    pub trigger: Trigger,
    /// Status the task held before the run started.
    pub restore: TaskStatus,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingAttempt {
    pub at: DateTime<Utc>,
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_abort_restore_status() {
        let mut st = TaskState::new();
        st.status = TaskStatus::Paused;
        st.begin_run(Trigger::Manual);
        assert_eq!(st.status, TaskStatus::Running);
        assert_eq!(st.active.map(|r| r.restore), Some(TaskStatus::Paused));

        st.pending = Some(PendingAttempt {
            at: Utc::now(),
            attempt: 2,
        });
        st.abort_run();
        assert_eq!(st.status, TaskStatus::Paused);
        assert!(st.active.is_none());
        assert!(st.pending.is_none());
        assert_eq!(st.attempt_gen, 1);
    }
}
