use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::core::{Lifecycle, Scheduler};
use super::dispatch::run_dispatch_loop;
use crate::error::{Result, SchedulerError};
use crate::sync;

impl Scheduler {
    /// Start the dispatch loop on the current tokio runtime.
    ///
    /// Tasks registered before `start` become due from their registration
    /// time. A stopped scheduler can be started again.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;

        let mut lifecycle = sync::lock(&self.lifecycle, "scheduler lifecycle");
        if lifecycle.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.shared.pool.attach(handle.clone());
        *sync::lock(&self.shared.runs, "run token") = CancellationToken::new();
        self.shared.reindex();

        let shutdown = CancellationToken::new();
        let dispatch = handle.spawn(run_dispatch_loop(Arc::clone(&self.shared), shutdown.clone()));
        *lifecycle = Some(Lifecycle { shutdown, dispatch });

        info!(
            "Scheduler started with {} workers, {} registered tasks",
            self.shared.config.max_workers,
            self.shared.registry().len()
        );
        Ok(())
    }

    /// Stop dispatching and wait for in-flight executions.
    ///
    /// Waits at most `shutdown_grace`; after that, queued attempts are
    /// dropped and running ones are signalled through their cancellation
    /// token and left to finish on their own. Runs waiting for a retry are
    /// dropped and their tasks return to the status they had before the run.
    /// Stopping an idle scheduler is a no-op.
    pub async fn stop(&self) {
        let Some(lifecycle) = sync::lock(&self.lifecycle, "scheduler lifecycle").take() else {
            return;
        };

        info!("Scheduler stopping");
        lifecycle.shutdown.cancel();
        if let Err(e) = lifecycle.dispatch.await {
            warn!("Dispatch loop ended abnormally: {}", e);
        }

        let grace = self.shared.config.shutdown_grace;
        match tokio::time::timeout(grace, self.shared.pool.wait_idle()).await {
            Ok(()) => info!("Scheduler stopped; all executions finished"),
            Err(_) => {
                let abandoned_queued = self.shared.pool.abandon_queued();
                let still_running = self.shared.pool.snapshot().active_workers;
                self.shared.run_token().cancel();
                warn!(
                    "Shutdown grace period of {:?} elapsed; abandoning {} running and {} queued executions",
                    grace, still_running, abandoned_queued
                );
            }
        }

        let parked = self.shared.abandon_parked();
        if parked > 0 {
            info!("Dropped {} runs waiting to retry", parked);
        }
    }
}
