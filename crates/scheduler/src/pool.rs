//! Bounded worker pool.
//!
//! At most `max_workers` jobs execute at once and at most `queue_size` more
//! wait in FIFO order. Submission never blocks: a saturated pool hands the
//! job back to the caller, which keeps it due and retries once
//! [`WorkerPool::capacity_freed`] fires.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::stats::PoolSnapshot;
use crate::sync::{self, panic_message};

/// A unit of work the pool can execute or drop.
pub(crate) trait PoolJob: Send + 'static {
    fn run(self) -> BoxFuture<'static, ()>;

    /// Called instead of `run` for a queued job discarded at shutdown.
    fn abandon(self);
}

pub(crate) struct WorkerPool<J> {
    max_workers: usize,
    queue_size: usize,
    state: Mutex<PoolState<J>>,
    handle: Mutex<Option<Handle>>,
    capacity: Notify,
    idle: Notify,
}

struct PoolState<J> {
    active: usize,
    queue: VecDeque<J>,
}

impl<J: PoolJob> WorkerPool<J> {
    pub(crate) fn new(max_workers: usize, queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            max_workers: max_workers.max(1),
            queue_size,
            state: Mutex::new(PoolState {
                active: 0,
                queue: VecDeque::with_capacity(queue_size),
            }),
            handle: Mutex::new(None),
            capacity: Notify::new(),
            idle: Notify::new(),
        })
    }

    /// Bind the pool to the runtime its workers are spawned on.
    pub(crate) fn attach(&self, handle: Handle) {
        *sync::lock(&self.handle, "pool handle") = Some(handle);
    }

    /// Start `job` on a free worker or queue it. Returns the job when the
    /// pool is saturated or not attached to a runtime.
    pub(crate) fn try_submit(self: &Arc<Self>, job: J) -> Result<(), J> {
        let Some(handle) = sync::lock(&self.handle, "pool handle").clone() else {
            return Err(job);
        };
        let mut state = self.state();
        if state.active < self.max_workers {
            state.active += 1;
            drop(state);
            self.spawn_worker(&handle, job);
            Ok(())
        } else if state.queue.len() < self.queue_size {
            state.queue.push_back(job);
            Ok(())
        } else {
            Err(job)
        }
    }

    fn spawn_worker(self: &Arc<Self>, handle: &Handle, first: J) {
        let pool = Arc::clone(self);
        handle.spawn(async move {
            let mut job = first;
            loop {
                if let Err(panic) = AssertUnwindSafe(job.run()).catch_unwind().await {
                    error!("Pool job panicked: {}", panic_message(panic.as_ref()));
                }
                let next = {
                    let mut state = pool.state();
                    let next = state.queue.pop_front();
                    if next.is_none() {
                        state.active -= 1;
                    }
                    next
                };
                pool.capacity.notify_one();
                match next {
                    Some(queued) => job = queued,
                    None => break,
                }
            }
            if pool.is_idle() {
                pool.idle.notify_waiters();
            }
        });
    }

    pub(crate) fn snapshot(&self) -> PoolSnapshot {
        let state = self.state();
        PoolSnapshot {
            active_workers: state.active,
            queued_jobs: state.queue.len(),
            max_workers: self.max_workers,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        let state = self.state();
        state.active == 0 && state.queue.is_empty()
    }

    /// Resolves once no job is executing or queued.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Resolves after a worker finished a job.
    pub(crate) async fn capacity_freed(&self) {
        self.capacity.notified().await
    }

    /// Drop every queued job, calling [`PoolJob::abandon`] on each.
    pub(crate) fn abandon_queued(&self) -> usize {
        let abandoned: Vec<J> = self.state().queue.drain(..).collect();
        let count = abandoned.len();
        for job in abandoned {
            job.abandon();
        }
        if count > 0 {
            debug!(count, "abandoned queued jobs");
        }
        if self.is_idle() {
            self.idle.notify_waiters();
        }
        count
    }

    fn state(&self) -> MutexGuard<'_, PoolState<J>> {
        sync::lock(&self.state, "pool state")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::FutureExt;
    use tokio::sync::oneshot;

    use super::*;

    struct TestJob {
        ran: Arc<AtomicUsize>,
        abandoned: Arc<AtomicUsize>,
        hold: Duration,
    }

    impl PoolJob for TestJob {
        fn run(self) -> BoxFuture<'static, ()> {
            async move {
                tokio::time::sleep(self.hold).await;
                self.ran.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }

        fn abandon(self) {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Counters {
        ran: Arc<AtomicUsize>,
        abandoned: Arc<AtomicUsize>,
    }

    impl Counters {
        fn new() -> Self {
            Self {
                ran: Arc::new(AtomicUsize::new(0)),
                abandoned: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn job(&self, hold_ms: u64) -> TestJob {
            TestJob {
                ran: Arc::clone(&self.ran),
                abandoned: Arc::clone(&self.abandoned),
                hold: Duration::from_millis(hold_ms),
            }
        }
    }

    fn attached(max_workers: usize, queue_size: usize) -> Arc<WorkerPool<TestJob>> {
        let pool = WorkerPool::new(max_workers, queue_size);
        pool.attach(Handle::current());
        pool
    }

    #[tokio::test]
    async fn unattached_pool_rejects() {
        let pool = WorkerPool::<TestJob>::new(2, 2);
        let c = Counters::new();
        assert!(pool.try_submit(c.job(0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn saturation_hands_job_back() {
        let pool = attached(1, 1);
        let c = Counters::new();

        assert!(pool.try_submit(c.job(100)).is_ok());
        assert!(pool.try_submit(c.job(100)).is_ok());
        assert!(pool.try_submit(c.job(100)).is_err());

        let snap = pool.snapshot();
        assert_eq!(snap.active_workers, 1);
        assert_eq!(snap.queued_jobs, 1);

        pool.wait_idle().await;
        assert_eq!(c.ran.load(Ordering::SeqCst), 2);
        assert_eq!(pool.snapshot().active_workers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_queue_size_runs_only_on_free_workers() {
        let pool = attached(2, 0);
        let c = Counters::new();

        assert!(pool.try_submit(c.job(50)).is_ok());
        assert!(pool.try_submit(c.job(50)).is_ok());
        assert!(pool.try_submit(c.job(50)).is_err());

        pool.capacity_freed().await;
        assert!(pool.try_submit(c.job(50)).is_ok());
        pool.wait_idle().await;
        assert_eq!(c.ran.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_jobs_run_in_fifo_order() {
        let pool = WorkerPool::new(1, 4);
        pool.attach(Handle::current());
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Ordered(u32, Arc<Mutex<Vec<u32>>>);
        impl PoolJob for Ordered {
            fn run(self) -> BoxFuture<'static, ()> {
                async move { self.1.lock().unwrap().push(self.0) }.boxed()
            }
            fn abandon(self) {}
        }

        for n in 0..4 {
            assert!(pool.try_submit(Ordered(n, Arc::clone(&order))).is_ok());
        }
        pool.wait_idle().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_drops_only_queued_jobs() {
        let pool = attached(1, 3);
        let c = Counters::new();
        for _ in 0..3 {
            assert!(pool.try_submit(c.job(100)).is_ok());
        }

        assert_eq!(pool.abandon_queued(), 2);
        assert_eq!(c.abandoned.load(Ordering::SeqCst), 2);

        pool.wait_idle().await;
        assert_eq!(c.ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_releases_its_worker() {
        struct Boom(Arc<AtomicUsize>);
        impl PoolJob for Boom {
            fn run(self) -> BoxFuture<'static, ()> {
                async move {
                    self.0.fetch_add(1, Ordering::SeqCst);
                    assert!(self.0.load(Ordering::SeqCst) > 2, "job blew up");
                }
                .boxed()
            }
            fn abandon(self) {}
        }

        let pool = WorkerPool::new(1, 1);
        pool.attach(Handle::current());
        let runs = Arc::new(AtomicUsize::new(0));
        assert!(pool.try_submit(Boom(Arc::clone(&runs))).is_ok());
        assert!(pool.try_submit(Boom(Arc::clone(&runs))).is_ok());

        tokio::time::timeout(Duration::from_secs(1), pool.wait_idle())
            .await
            .expect("pool should drain after panicking jobs");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(pool.snapshot().active_workers, 0);

        // The slot is usable again.
        assert!(pool.try_submit(Boom(Arc::clone(&runs))).is_ok());
        pool.wait_idle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_returns_immediately_when_empty() {
        let pool = attached(1, 0);
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            pool.wait_idle().await;
            let _ = tx.send(());
        });
        tokio::time::timeout(Duration::from_millis(1), rx)
            .await
            .expect("idle pool should resolve")
            .unwrap();
    }
}
