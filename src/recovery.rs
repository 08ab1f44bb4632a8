//! Run-once fast-queue rebuild.
//!
//! The durable store survives a crash; the fast queue does not. Before any
//! loop starts, every pending job the store believes is queued is pushed
//! again. Duplicate pushes are harmless because the claim is the sole
//! authority over execution.

use std::sync::Arc;

use crate::error::Result;
use crate::job::JobState;
use crate::queue::FastQueue;
use crate::store::{JobMutation, JobStore};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub failed: usize,
}

pub struct RecoveryService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn FastQueue>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn FastQueue>) -> Self {
        Self { store, queue }
    }

    /// Re-push every believed-queued job onto its partition. A failed push
    /// clears `queued_at` so the scheduler promotes the job again instead
    /// of leaving it stranded behind a stale marker.
    pub async fn rebuild(&self) -> Result<RecoveryReport> {
        tracing::info!("Rebuilding fast queue from store");
        let mut report = RecoveryReport::default();

        for job in self.store.believed_queued().await? {
            match self.queue.push(job.queue_type, job.id).await {
                Ok(()) => report.recovered += 1,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Could not recover job, clearing queued marker");
                    if let Err(e) = self
                        .store
                        .update_in_state(job.id, JobState::Pending, JobMutation::clear_queued())
                        .await
                    {
                        tracing::warn!(job_id = %job.id, error = %e, "Failed to clear queued marker");
                    }
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            recovered = report.recovered,
            failed = report.failed,
            "Fast queue rebuilt"
        );
        Ok(report)
    }
}
