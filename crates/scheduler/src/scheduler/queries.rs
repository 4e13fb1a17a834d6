use super::core::Scheduler;
use crate::error::Result;
use crate::stats::{SchedulerStats, TaskStats};
use crate::task::{TaskStatus, TaskView};

impl Scheduler {
    /// Snapshot of every registered task, in registration order.
    pub fn list_tasks(&self) -> Vec<TaskView> {
        let mut views: Vec<(u64, TaskView)> = self
            .shared
            .registry()
            .values()
            .map(|task| {
                let seq = task.state().seq;
                (seq, task.view())
            })
            .collect();
        views.sort_by_key(|(seq, _)| *seq);
        views.into_iter().map(|(_, view)| view).collect()
    }

    pub fn get_task(&self, id: &str) -> Result<TaskView> {
        Ok(self.shared.task(id)?.view())
    }

    pub fn get_task_status(&self, id: &str) -> Result<TaskStatus> {
        Ok(self.shared.task(id)?.status())
    }

    pub fn get_task_stats(&self, id: &str) -> Result<TaskStats> {
        Ok(self.shared.task(id)?.stats())
    }

    /// Aggregate over all tasks plus current pool occupancy.
    pub fn get_scheduler_stats(&self) -> SchedulerStats {
        let views = self.list_tasks();
        SchedulerStats::aggregate(&views, self.shared.pool.snapshot())
    }
}
