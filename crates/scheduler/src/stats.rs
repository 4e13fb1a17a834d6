//! Per-task counters and the derived scheduler-wide aggregate.

use std::time::Duration;

use serde::Serialize;

use crate::task::{TaskStatus, TaskView};

/// Execution counters for a single task.
///
/// Updated once per attempt (success or failure), whether or not the attempt
/// is retried. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub total_runs: u64,
    pub success_runs: u64,
    pub failed_runs: u64,
    /// Duration of the most recent attempt.
    pub last_duration: Option<Duration>,
    /// Mean attempt duration.
    pub avg_duration: Duration,
    /// Error text of the most recent failed attempt.
    pub last_error: Option<String>,
}

impl TaskStats {
    /// Record one finished attempt.
    pub(crate) fn record_attempt(&mut self, duration: Duration, error: Option<String>) {
        self.total_runs += 1;
        match error {
            None => self.success_runs += 1,
            Some(e) => {
                self.failed_runs += 1;
                self.last_error = Some(e);
            }
        }
        self.last_duration = Some(duration);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_duration = if self.total_runs == 1 {
            duration
        } else {
            let prev_nanos = self.avg_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / self.total_runs as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }
}

/// Worker pool occupancy at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub active_workers: usize,
    pub queued_jobs: usize,
    pub max_workers: usize,
}

/// Scheduler-wide aggregate, derived from a registry snapshot at query time.
///
/// Not separately maintained, so it can lag individual task transitions that
/// happen concurrently with the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub total_tasks: usize,
    pub scheduled_tasks: usize,
    pub running_tasks: usize,
    pub paused_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub total_runs: u64,
    pub success_runs: u64,
    pub failed_runs: u64,
    pub active_workers: usize,
    pub queued_jobs: usize,
    pub max_workers: usize,
    /// Worker utilization ratio (0.0 - 1.0).
    pub worker_utilization: f64,
}

impl SchedulerStats {
    pub(crate) fn aggregate(tasks: &[TaskView], pool: PoolSnapshot) -> Self {
        let mut stats = Self {
            total_tasks: tasks.len(),
            active_workers: pool.active_workers,
            queued_jobs: pool.queued_jobs,
            max_workers: pool.max_workers,
            ..Self::default()
        };

        for task in tasks {
            match task.status {
                TaskStatus::Scheduled => stats.scheduled_tasks += 1,
                TaskStatus::Running => stats.running_tasks += 1,
                TaskStatus::Paused => stats.paused_tasks += 1,
                TaskStatus::Completed => stats.completed_tasks += 1,
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Pending | TaskStatus::Removed => {}
            }
            stats.total_runs += task.stats.total_runs;
            stats.success_runs += task.stats.success_runs;
            stats.failed_runs += task.stats.failed_runs;
        }

        if pool.max_workers > 0 {
            stats.worker_utilization = pool.active_workers as f64 / pool.max_workers as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_attempt() {
        let mut s = TaskStats::default();
        s.record_attempt(Duration::from_millis(100), None);

        assert_eq!(s.total_runs, 1);
        assert_eq!(s.success_runs, 1);
        assert_eq!(s.failed_runs, 0);
        assert_eq!(s.avg_duration, Duration::from_millis(100));
    }

    #[test]
    fn record_failures_keep_last_error() {
        let mut s = TaskStats::default();
        s.record_attempt(Duration::from_millis(5), Some("boom".into()));
        s.record_attempt(Duration::from_millis(5), None);

        assert_eq!(s.total_runs, 2);
        assert_eq!(s.success_runs, 1);
        assert_eq!(s.failed_runs, 1);
        assert_eq!(s.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn record_multiple_attempts_averages() {
        let mut s = TaskStats::default();
        s.record_attempt(Duration::from_millis(100), None);
        s.record_attempt(Duration::from_millis(200), None);

        // Average of 100ms and 200ms = 150ms
        let avg = s.avg_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
        assert_eq!(s.last_duration, Some(Duration::from_millis(200)));
    }

    #[test]
    fn empty_aggregate() {
        let stats = SchedulerStats::aggregate(&[], PoolSnapshot::default());
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.worker_utilization, 0.0);
    }

    #[test]
    fn utilization_from_pool_snapshot() {
        let pool = PoolSnapshot {
            active_workers: 3,
            queued_jobs: 2,
            max_workers: 4,
        };
        let stats = SchedulerStats::aggregate(&[], pool);
        assert_eq!(stats.active_workers, 3);
        assert_eq!(stats.queued_jobs, 2);
        assert!((stats.worker_utilization - 0.75).abs() < f64::EPSILON);
    }
}
