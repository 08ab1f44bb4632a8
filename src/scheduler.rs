//! Promotion loop: moves due jobs from the durable store into the fast
//! queue.
//!
//! Ordering is push-before-persist. If the `queued_at` persist fails after
//! a successful push the job may be pushed again later; that duplicate is
//! harmless because only the atomic claim transitions a job out of
//! `Pending`. If the push itself fails, `queued_at` stays null and the job
//! is retried on the next tick, so no job is ever marked queued without
//! having been pushed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::queue::FastQueue;
use crate::store::{JobMutation, JobStore};

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn FastQueue>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn FastQueue>, config: &EngineConfig) -> Self {
        Self {
            store,
            queue,
            interval: Duration::from_millis(config.scheduler_interval_ms),
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Promote every due, not-yet-queued pending job. Returns the number
    /// promoted this tick.
    pub async fn tick(&self) -> Result<usize> {
        let now = Utc::now();
        let due = self.store.due_unqueued(now).await?;
        let mut promoted = 0;

        for job in due {
            match self.queue.push(job.queue_type, job.id).await {
                Ok(()) => {
                    // Persist after push. A lost race here just means some
                    // other actor already moved the job on; skip quietly.
                    match self
                        .store
                        .update_in_state(job.id, job.state, JobMutation::mark_queued(Utc::now()))
                        .await
                    {
                        Ok(Some(_)) => {
                            promoted += 1;
                            tracing::info!(job_id = %job.id, queue = %job.queue_type, "Promoted job to fast queue");
                        }
                        Ok(None) => {
                            tracing::debug!(job_id = %job.id, "Job changed state during promotion");
                        }
                        Err(e) => {
                            tracing::warn!(job_id = %job.id, error = %e, "Failed to persist queued_at");
                        }
                    }
                }
                Err(e) => {
                    // queued_at stays null; the next tick retries.
                    tracing::warn!(job_id = %job.id, error = %e, "Fast queue push failed, will retry next tick");
                }
            }
        }

        Ok(promoted)
    }
}
