use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::due::{DueEntry, DueQueue, EntryKind};
use super::execution::RunJob;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::event::TaskEvent;
use crate::pool::WorkerPool;
use crate::sync;
use crate::task::{Task, TaskStatus};

const EVENT_CAPACITY: usize = 256;

/// Due-index size below which superseded entries are left to expire.
const PRUNE_MIN_ENTRIES: usize = 64;

/// The task scheduler. Owns the registry of tasks, a due-time index and a
/// bounded [`WorkerPool`] that executes task functions.
///
/// Operations take `&self`; share it behind an `Arc` to drive it from
/// several places.
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
    /// `Some` between `start()` and `stop()`.
    pub(super) lifecycle: Mutex<Option<Lifecycle>>,
}

/// State shared by the scheduler handle, the dispatch loop and running jobs.
pub(crate) struct Shared {
    pub(super) config: SchedulerConfig,
    pub(super) clock: Clock,
    pub(super) registry: RwLock<HashMap<String, Task>>,
    pub(super) due: Mutex<DueQueue>,
    /// Wakes the dispatch loop after the due index changed.
    pub(super) wake: Notify,
    pub(super) pool: Arc<WorkerPool<RunJob>>,
    pub(super) events: broadcast::Sender<TaskEvent>,
    /// Parent of every attempt's cancellation token; replaced on each start.
    pub(super) runs: Mutex<CancellationToken>,
    next_seq: AtomicU64,
}

pub(super) struct Lifecycle {
    pub shutdown: CancellationToken,
    pub dispatch: JoinHandle<()>,
}

impl Scheduler {
    /// Create a stopped scheduler. Fails if `config` is invalid.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Scheduler created: max_workers={}, queue_size={}, shutdown_grace={:?}",
            config.max_workers, config.queue_size, config.shutdown_grace
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pool = WorkerPool::new(config.max_workers, config.queue_size);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                clock: Clock::new(),
                registry: RwLock::new(HashMap::new()),
                due: Mutex::new(DueQueue::default()),
                wake: Notify::new(),
                pool,
                events,
                runs: Mutex::new(CancellationToken::new()),
                next_seq: AtomicU64::new(1),
            }),
            lifecycle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        sync::lock(&self.lifecycle, "scheduler lifecycle").is_some()
    }

    /// Receive a [`TaskEvent`] for every finished attempt.
    ///
    /// Slow receivers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(lifecycle) = lifecycle {
            lifecycle.shutdown.cancel();
            self.shared.run_token().cancel();
        }
    }
}

impl Shared {
    pub(super) fn registry(&self) -> RwLockReadGuard<'_, HashMap<String, Task>> {
        sync::read(&self.registry, "task registry")
    }

    pub(super) fn registry_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Task>> {
        sync::write(&self.registry, "task registry")
    }

    pub(super) fn due(&self) -> MutexGuard<'_, DueQueue> {
        sync::lock(&self.due, "due index")
    }

    pub(super) fn run_token(&self) -> CancellationToken {
        sync::lock(&self.runs, "run token").clone()
    }

    pub(super) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn task(&self, id: &str) -> Result<Task> {
        self.registry()
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    /// Whether `task` is still the registered task under its id.
    pub(super) fn is_registered(&self, task: &Task) -> bool {
        self.registry()
            .get(task.id())
            .is_some_and(|current| current.same_task(task))
    }

    /// Index a due time and wake the dispatch loop.
    pub(super) fn push_due(
        &self,
        id: &str,
        at: DateTime<Utc>,
        seq: u64,
        kind: EntryKind,
        generation: u64,
    ) {
        self.due().push(DueEntry {
            at,
            seq,
            kind,
            generation,
            id: id.to_string(),
        });
        self.wake.notify_one();
    }

    /// Drop superseded entries once they dominate the due index.
    ///
    /// Each task holds at most one live occurrence and one live attempt.
    /// Seqs and generations only grow, so an entry older than the marks read
    /// here is stale even if newer entries are pushed concurrently.
    pub(super) fn prune_due(&self) {
        let (marks, seq_bound) = {
            let registry = self.registry();
            if self.due().len() <= PRUNE_MIN_ENTRIES.max(registry.len() * 4) {
                return;
            }
            let marks: HashMap<String, LiveMark> = registry
                .values()
                .map(|task| {
                    let st = task.state();
                    let mark = LiveMark {
                        seq: st.seq,
                        schedule_gen: st.schedule_gen,
                        attempt_gen: st.attempt_gen,
                    };
                    (task.id().to_string(), mark)
                })
                .collect();
            (marks, self.next_seq.load(Ordering::Relaxed))
        };

        let mut due = self.due();
        let before = due.len();
        due.retain(|entry| match marks.get(&entry.id) {
            Some(mark) if mark.seq == entry.seq => entry.generation >= mark.generation(entry.kind),
            Some(mark) => entry.seq > mark.seq,
            // Removed, unless registered after the marks were taken.
            None => entry.seq >= seq_bound,
        });
        debug!("Pruned due index from {} to {} entries", before, due.len());
    }

    /// Rebuild the due index from the registry.
    pub(super) fn reindex(&self) {
        let mut entries = Vec::new();
        for task in self.registry().values() {
            let st = task.state();
            if st.status == TaskStatus::Scheduled {
                if let Some(at) = st.next_run_at {
                    entries.push(DueEntry {
                        at,
                        seq: st.seq,
                        kind: EntryKind::Occurrence,
                        generation: st.schedule_gen,
                        id: task.id().to_string(),
                    });
                }
            }
            if let Some(pending) = st.pending {
                entries.push(DueEntry {
                    at: pending.at,
                    seq: st.seq,
                    kind: EntryKind::Attempt,
                    generation: st.attempt_gen,
                    id: task.id().to_string(),
                });
            }
        }

        let mut due = self.due();
        due.clear();
        for entry in entries {
            due.push(entry);
        }
    }
}

/// Current seq and generations of a registered task.
struct LiveMark {
    seq: u64,
    schedule_gen: u64,
    attempt_gen: u64,
}

impl LiveMark {
    fn generation(&self, kind: EntryKind) -> u64 {
        match kind {
            EntryKind::Occurrence => self.schedule_gen,
            EntryKind::Attempt => self.attempt_gen,
        }
    }
}
