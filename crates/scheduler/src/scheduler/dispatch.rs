//! The dispatch loop: sleeps until the earliest due time, then hands every
//! due occurrence or attempt to the worker pool without blocking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::core::Shared;
use super::due::{DueEntry, EntryKind};
use crate::task::{TaskStatus, Trigger};

enum Dispatch {
    Submitted,
    /// Outdated entry; dropped.
    Stale,
    /// Task is running another run; retried after the next completion.
    Busy,
    /// Pool full; retried once capacity frees up.
    Saturated,
}

pub(super) async fn run_dispatch_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    info!("Dispatch loop started");
    let mut deferred: Vec<DueEntry> = Vec::new();

    loop {
        let now = shared.clock.now();
        let mut due = std::mem::take(&mut deferred);
        due.extend(shared.due().pop_due(now));
        due.sort();

        let mut saturated = false;
        for entry in due {
            if saturated {
                deferred.push(entry);
                continue;
            }
            match shared.dispatch_entry(&entry, now) {
                Dispatch::Submitted | Dispatch::Stale => {}
                Dispatch::Busy => deferred.push(entry),
                Dispatch::Saturated => {
                    debug!("Worker pool saturated; deferring task {}", entry.id);
                    saturated = true;
                    deferred.push(entry);
                }
            }
        }

        shared.prune_due();
        let next_at = shared.due().peek_at();
        let wait_for_capacity = !deferred.is_empty();
        trace!(?next_at, deferred = deferred.len(), "Dispatch loop waiting");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = shared.wake.notified() => {}
            _ = shared.pool.capacity_freed(), if wait_for_capacity => {}
            _ = sleep_until(&shared, next_at) => {}
        }
    }

    // Deferred entries are rebuilt from task state on the next start.
    info!("Dispatch loop stopped");
}

async fn sleep_until(shared: &Shared, at: Option<DateTime<Utc>>) {
    match at {
        Some(at) => tokio::time::sleep_until(shared.clock.instant_at(at)).await,
        None => std::future::pending().await,
    }
}

impl Shared {
    fn dispatch_entry(self: &Arc<Self>, entry: &DueEntry, now: DateTime<Utc>) -> Dispatch {
        let Some(task) = self.registry().get(&entry.id).cloned() else {
            return Dispatch::Stale;
        };
        let mut st = task.state();
        if st.seq != entry.seq {
            return Dispatch::Stale;
        }

        match entry.kind {
            EntryKind::Occurrence => {
                if entry.generation != st.schedule_gen {
                    return Dispatch::Stale;
                }
                match st.status {
                    TaskStatus::Scheduled => {}
                    TaskStatus::Running => return Dispatch::Busy,
                    _ => return Dispatch::Stale,
                }
                st.begin_run(Trigger::Scheduled);
                if self.launch(&task, &st, 1) {
                    trace!(
                        "Dispatched task {} (due {}, late by {})",
                        task.id(),
                        entry.at,
                        now - entry.at
                    );
                    Dispatch::Submitted
                } else {
                    st.abort_run();
                    Dispatch::Saturated
                }
            }
            EntryKind::Attempt => {
                if entry.generation != st.attempt_gen {
                    return Dispatch::Stale;
                }
                let Some(pending) = st.pending.take() else {
                    return Dispatch::Stale;
                };
                if self.launch(&task, &st, pending.attempt) {
                    Dispatch::Submitted
                } else {
                    st.pending = Some(pending);
                    Dispatch::Saturated
                }
            }
        }
    }
}
