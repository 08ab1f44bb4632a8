//! Engine orchestration: recovery first, then the periodic loops.
//!
//! Every loop is an independently scheduled tokio task communicating only
//! through the shared store and fast queue, all watching one cancellation
//! token for graceful shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::attempt::AttemptLog;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::queue::FastQueue;
use crate::reaper::LeaseReaper;
use crate::recovery::RecoveryService;
use crate::scheduler::Scheduler;
use crate::store::JobStore;
use crate::worker::{TaskExecutor, Worker};

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn FastQueue>,
    executor: Arc<dyn TaskExecutor>,
    attempts: Arc<AttemptLog>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn FastQueue>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            executor,
            attempts: Arc::new(AttemptLog::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    pub fn attempts(&self) -> Arc<AttemptLog> {
        self.attempts.clone()
    }

    /// Run recovery, then spawn the scheduler, the reaper, and the worker
    /// loops. Returns once everything is spawned; a recovery failure at
    /// the store level is fatal, per-job queue failures are not.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        RecoveryService::new(self.store.clone(), self.queue.clone())
            .rebuild()
            .await?;

        let scheduler = Arc::new(Scheduler::new(
            self.store.clone(),
            self.queue.clone(),
            &self.config,
        ));
        tokio::spawn(scheduler.run(shutdown.clone()));

        let reaper = Arc::new(LeaseReaper::new(self.store.clone(), &self.config));
        tokio::spawn(reaper.run(shutdown.clone()));

        for _ in 0..self.config.worker_count {
            let worker = Arc::new(Worker::new(
                self.store.clone(),
                self.queue.clone(),
                self.executor.clone(),
                self.attempts.clone(),
                self.config.clone(),
            ));
            tracing::info!(worker_id = %worker.id(), "Starting worker");
            tokio::spawn(worker.clone().run_ingestion(shutdown.clone()));
            tokio::spawn(worker.clone().run_execution(shutdown.clone()));
            tokio::spawn(worker.run_heartbeat(shutdown.clone()));
        }

        Ok(())
    }
}
