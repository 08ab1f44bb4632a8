//! Durable job store contract.
//!
//! The store is the source of truth for every job. Its single
//! mutual-exclusion primitive is [`JobStore::update_in_state`]: a
//! compare-and-set that applies a [`JobMutation`] only while the job is
//! still in the expected state. Every transition out of `Pending` into
//! `Running` goes through it, which is what guarantees at-most-one active
//! executor per job no matter how many schedulers and workers race.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::job::{Job, JobId, JobState, NewJob};

pub use memory::MemoryStore;

/// Field set applied by a conditional update. `None` leaves a field
/// untouched; the double-`Option` fields distinguish "leave alone" from
/// "clear".
#[derive(Debug, Clone, Default)]
pub struct JobMutation {
    pub state: Option<JobState>,
    pub attempts: Option<u32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub queued_at: Option<Option<DateTime<Utc>>>,
    pub owner_worker_id: Option<Option<String>>,
    pub lease_expires_at: Option<Option<DateTime<Utc>>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub last_error: Option<Option<String>>,
}

impl JobMutation {
    /// Pending -> Running, granting a lease. Owner and expiry are set
    /// together; leaving `Pending` clears `queued_at`.
    pub fn claim(worker_id: &str, lease_until: DateTime<Utc>) -> Self {
        Self {
            state: Some(JobState::Running),
            owner_worker_id: Some(Some(worker_id.to_string())),
            lease_expires_at: Some(Some(lease_until)),
            queued_at: Some(None),
            ..Default::default()
        }
    }

    /// Running -> Succeeded. Terminal; no other field changes.
    pub fn succeed() -> Self {
        Self {
            state: Some(JobState::Succeeded),
            ..Default::default()
        }
    }

    /// Running -> Pending after a failed attempt: bump the attempt count,
    /// push `scheduled_at` out by the backoff delay, release the lease and
    /// force re-promotion.
    pub fn retry(attempts: u32, next_attempt_at: DateTime<Utc>, error: String) -> Self {
        Self {
            state: Some(JobState::Pending),
            attempts: Some(attempts),
            scheduled_at: Some(next_attempt_at),
            queued_at: Some(None),
            owner_worker_id: Some(None),
            lease_expires_at: Some(None),
            last_error: Some(Some(error)),
            ..Default::default()
        }
    }

    /// Running -> Dead after the retry budget is exhausted. Terminal;
    /// `last_error` is retained.
    pub fn dead(attempts: u32, error: String) -> Self {
        Self {
            state: Some(JobState::Dead),
            attempts: Some(attempts),
            last_error: Some(Some(error)),
            ..Default::default()
        }
    }

    /// Running -> Pending by the lease reaper: release the lease without
    /// counting an attempt, rescheduled a short grace delay out.
    pub fn release(retry_at: DateTime<Utc>) -> Self {
        Self {
            state: Some(JobState::Pending),
            scheduled_at: Some(retry_at),
            queued_at: Some(None),
            owner_worker_id: Some(None),
            lease_expires_at: Some(None),
            ..Default::default()
        }
    }

    /// Record a successful fast-queue push. No state change.
    pub fn mark_queued(at: DateTime<Utc>) -> Self {
        Self {
            queued_at: Some(Some(at)),
            ..Default::default()
        }
    }

    /// Forget a queue residency marker that is no longer believed.
    pub fn clear_queued() -> Self {
        Self {
            queued_at: Some(None),
            ..Default::default()
        }
    }

    /// Heartbeat: extend the lease of a running job.
    pub fn extend_lease(lease_until: DateTime<Utc>, heartbeat_at: DateTime<Utc>) -> Self {
        Self {
            lease_expires_at: Some(Some(lease_until)),
            heartbeat_at: Some(heartbeat_at),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job, deduplicating on idempotency key: a duplicate
    /// submission resolves to the existing job rather than a new row.
    async fn create(&self, spec: NewJob) -> Result<Job>;

    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    async fn all(&self) -> Result<Vec<Job>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>>;

    /// Pending jobs due at `now` that the scheduler has not yet pushed
    /// (`queued_at` null).
    async fn due_unqueued(&self, now: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Store-side ingestion fallback: due, unqueued pending jobs ordered by
    /// priority descending then `scheduled_at` ascending, bounded by `limit`.
    async fn fallback_candidates(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>>;

    /// Pending jobs believed resident in the fast queue (`queued_at` set).
    async fn believed_queued(&self) -> Result<Vec<Job>>;

    /// Running jobs whose lease expired before `now`.
    async fn expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Running jobs held by the given worker.
    async fn running_owned_by(&self, worker_id: &str) -> Result<Vec<Job>>;

    /// Atomic conditional update: apply `mutation` only if the job's state
    /// is still `expected`. Returns the updated job, or `None` when the
    /// compare failed (another actor got there first). Linearizable per
    /// job id.
    async fn update_in_state(
        &self,
        id: JobId,
        expected: JobState,
        mutation: JobMutation,
    ) -> Result<Option<Job>>;
}
