use tracing::{debug, info};

use super::core::Scheduler;
use super::due::EntryKind;
use crate::error::{Result, SchedulerError};
use crate::task::state::PendingAttempt;
use crate::task::{Task, TaskStatus, Trigger};

impl Scheduler {
    /// Register a task and schedule its first occurrence.
    ///
    /// The task must have a schedule and must not have been registered
    /// before. Registration works whether or not the scheduler is running.
    pub fn add_task(&self, task: Task) -> Result<()> {
        let schedule = task.schedule().ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("task {} has no schedule", task.id()))
        })?;

        let mut registry = self.shared.registry_mut();
        if registry.contains_key(task.id()) {
            return Err(SchedulerError::DuplicateTaskId(task.id().to_string()));
        }

        let now = self.shared.clock.now();
        {
            let mut st = task.state();
            if st.status != TaskStatus::Pending {
                return Err(SchedulerError::InvalidState {
                    id: task.id().to_string(),
                    status: st.status,
                    op: "add",
                });
            }
            let first = schedule.first_due(now)?;
            st.seq = self.shared.next_seq();
            st.status = TaskStatus::Scheduled;
            st.next_run_at = first;
            st.schedule_gen += 1;
            if let Some(at) = first {
                self.shared
                    .push_due(task.id(), at, st.seq, EntryKind::Occurrence, st.schedule_gen);
            }
        }

        info!(
            "Registered task: {} ({}, {})",
            task.id(),
            task.name(),
            schedule.kind()
        );
        registry.insert(task.id().to_string(), task);
        Ok(())
    }

    /// Unregister a task. An in-flight execution finishes on its own and its
    /// result is discarded.
    pub fn remove_task(&self, id: &str) -> Result<()> {
        let task = self
            .shared
            .registry_mut()
            .remove(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        let mut st = task.state();
        let was = st.status;
        st.status = TaskStatus::Removed;
        st.next_run_at = None;
        st.pending = None;
        st.schedule_gen += 1;
        st.attempt_gen += 1;
        info!("Removed task: {} (was {})", id, was);
        Ok(())
    }

    /// Stop scheduling a task until it is resumed.
    pub fn pause_task(&self, id: &str) -> Result<()> {
        let registry = self.shared.registry_mut();
        let task = registry
            .get(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        let mut st = task.state();
        if st.status != TaskStatus::Scheduled {
            return Err(SchedulerError::InvalidState {
                id: id.to_string(),
                status: st.status,
                op: "pause",
            });
        }
        st.status = TaskStatus::Paused;
        st.schedule_gen += 1;
        info!("Paused task: {}", id);
        Ok(())
    }

    /// Reschedule a paused task from the current time. Occurrences missed
    /// while paused are not replayed.
    ///
    /// A recurring task disabled after exhausting its retries can be resumed
    /// the same way.
    pub fn resume_task(&self, id: &str) -> Result<()> {
        let registry = self.shared.registry_mut();
        let task = registry
            .get(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        let mut st = task.state();
        let resumable =
            st.status == TaskStatus::Paused || (st.status == TaskStatus::Failed && st.disabled);
        if !resumable {
            return Err(SchedulerError::InvalidState {
                id: id.to_string(),
                status: st.status,
                op: "resume",
            });
        }

        let now = self.shared.clock.now();
        let next = match task.schedule() {
            Some(schedule) => schedule.resume_due(st.next_run_at, now)?,
            None => None,
        };
        st.status = TaskStatus::Scheduled;
        st.disabled = false;
        st.next_run_at = next;
        st.schedule_gen += 1;
        if let Some(at) = next {
            self.shared
                .push_due(id, at, st.seq, EntryKind::Occurrence, st.schedule_gen);
        }
        info!("Resumed task: {} (next run {:?})", id, next);
        Ok(())
    }

    /// Execute a task immediately, outside its schedule.
    ///
    /// Does not wait for the execution and leaves `next_run_at` untouched.
    /// When the pool is saturated the run waits for a free worker like any
    /// due task.
    pub fn run_task_once(&self, id: &str) -> Result<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotStarted);
        }
        let task = self.shared.task(id)?;

        let mut st = task.state();
        match st.status {
            TaskStatus::Running => return Err(SchedulerError::AlreadyRunning(id.to_string())),
            TaskStatus::Removed => return Err(SchedulerError::TaskNotFound(id.to_string())),
            _ => {}
        }

        st.begin_run(Trigger::Manual);
        if self.shared.launch(&task, &st, 1) {
            info!("Running task {} once", id);
        } else {
            let pending = PendingAttempt {
                at: self.shared.clock.now(),
                attempt: 1,
            };
            self.shared.park_attempt(&task, &mut st, pending);
            debug!("Worker pool saturated; manual run of {} queued", id);
        }
        Ok(())
    }
}
