//! Lease reaper: returns jobs with an expired lease to the pending pool.
//!
//! An expired lease means the owning worker stopped heartbeating — crashed,
//! partitioned, or deadlocked. The task's real outcome is unknown, so this
//! path does not count an attempt; only a reported failure does.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::job::JobState;
use crate::store::{JobMutation, JobStore};

pub struct LeaseReaper {
    store: Arc<dyn JobStore>,
    interval: Duration,
    grace: chrono::Duration,
}

impl LeaseReaper {
    pub fn new(store: Arc<dyn JobStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            interval: Duration::from_millis(config.reaper_interval_ms),
            grace: chrono::Duration::seconds(config.reaper_grace_secs as i64),
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Lease reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Reaper tick failed");
                    }
                }
            }
        }
    }

    /// Reap every running job whose lease expired. Returns the number of
    /// jobs returned to the pending pool.
    pub async fn tick(&self) -> Result<usize> {
        let now = Utc::now();
        let stuck = self.store.expired_leases(now).await?;
        let mut reaped = 0;

        for job in stuck {
            tracing::warn!(
                job_id = %job.id,
                owner = job.owner_worker_id.as_deref().unwrap_or("-"),
                "Lease expired without heartbeat, returning job to pending"
            );
            match self
                .store
                .update_in_state(job.id, JobState::Running, JobMutation::release(now + self.grace))
                .await
            {
                Ok(Some(_)) => reaped += 1,
                Ok(None) => {
                    // The worker finished (or heartbeat landed) between the
                    // scan and the update; nothing to do.
                    tracing::debug!(job_id = %job.id, "Job settled before reaping");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to reap job");
                }
            }
        }

        Ok(reaped)
    }
}
