use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{ChronoError, Result};
use crate::job::{Job, JobId, JobState, NewJob};
use crate::store::{JobMutation, JobStore};

/// In-memory job store. All mutations run under one write lock, which makes
/// `update_in_state` linearizable per job id — the transactional stand-in
/// for a row-level conditional update.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply(job: &mut Job, mutation: JobMutation) {
    if let Some(state) = mutation.state {
        job.state = state;
    }
    if let Some(attempts) = mutation.attempts {
        job.attempts = attempts;
    }
    if let Some(scheduled_at) = mutation.scheduled_at {
        job.scheduled_at = scheduled_at;
    }
    if let Some(queued_at) = mutation.queued_at {
        job.queued_at = queued_at;
    }
    if let Some(owner) = mutation.owner_worker_id {
        job.owner_worker_id = owner;
    }
    if let Some(lease) = mutation.lease_expires_at {
        job.lease_expires_at = lease;
    }
    if let Some(heartbeat_at) = mutation.heartbeat_at {
        job.heartbeat_at = Some(heartbeat_at);
    }
    if let Some(last_error) = mutation.last_error {
        job.last_error = last_error;
    }
    job.updated_at = Utc::now();
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, spec: NewJob) -> Result<Job> {
        let mut jobs = self.jobs.write().await;

        if let Some(key) = spec.idempotency_key.as_deref() {
            if let Some(existing) = jobs
                .values()
                .find(|j| j.idempotency_key.as_deref() == Some(key))
            {
                tracing::warn!(
                    job_id = %existing.id,
                    idempotency_key = key,
                    "Duplicate submission resolved to existing job"
                );
                return Ok(existing.clone());
            }
        }

        let job = Job::from_spec(spec);
        tracing::info!(
            job_id = %job.id,
            queue = %job.queue_type,
            scheduled_at = %job.scheduled_at,
            "Created job"
        );
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut out: Vec<Job> = jobs.values().cloned().collect();
        out.sort_by_key(|j| j.created_at);
        Ok(out)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .find(|j| j.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn due_unqueued(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.scheduled_at <= now && j.queued_at.is_none())
            .cloned()
            .collect())
    }

    async fn fallback_candidates(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<Job> = jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.scheduled_at <= now && j.queued_at.is_none())
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn believed_queued(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.queued_at.is_some())
            .cloned()
            .collect())
    }

    async fn expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| {
                j.state == JobState::Running
                    && j.lease_expires_at.map(|at| at < now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn running_owned_by(&self, worker_id: &str) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| {
                j.state == JobState::Running && j.owner_worker_id.as_deref() == Some(worker_id)
            })
            .cloned()
            .collect())
    }

    async fn update_in_state(
        &self,
        id: JobId,
        expected: JobState,
        mutation: JobMutation,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(ChronoError::JobNotFound(id))?;
        if job.state != expected {
            return Ok(None);
        }
        apply(job, mutation);
        debug_assert!(job.lease_fields_consistent());
        Ok(Some(job.clone()))
    }
}
