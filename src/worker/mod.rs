//! Worker: claim, execute, retry.
//!
//! Each worker runs three independent periodic loops sharing only the
//! staging structure:
//! - **Ingestion** pops candidate ids from every fast-queue partition and
//!   pulls a bounded fallback batch straight from the store, staging jobs
//!   that are still durably `Pending`.
//! - **Execution** takes the soonest-due staged job, claims it through the
//!   store's conditional update, dispatches it, and applies the
//!   retry/dead-letter policy on failure.
//! - **Heartbeat** extends the lease of every running job this worker owns
//!   so long tasks survive the reaper.

pub mod executor;
pub mod staging;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::attempt::{AttemptLog, AttemptOutcome, AttemptRecord};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::job::{Job, JobState, QueueType};
use crate::queue::FastQueue;
use crate::store::{JobMutation, JobStore};

pub use executor::{SimulatedExecutor, TaskExecutor, TaskOutcome};
pub use staging::Staging;

/// Exponential backoff: `initial * 2^attempts`, computed after the attempt
/// counter was incremented. Saturates instead of overflowing.
pub fn backoff_delay_secs(initial_secs: u64, attempts: u32) -> u64 {
    let factor = 1u64 << attempts.min(32);
    initial_secs.saturating_mul(factor)
}

pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn FastQueue>,
    executor: Arc<dyn TaskExecutor>,
    attempts: Arc<AttemptLog>,
    staging: Mutex<Staging>,
    config: EngineConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn FastQueue>,
        executor: Arc<dyn TaskExecutor>,
        attempts: Arc<AttemptLog>,
        config: EngineConfig,
    ) -> Self {
        let id = format!("worker-{}", Uuid::new_v4().simple());
        Self {
            id,
            store,
            queue,
            executor,
            attempts,
            staging: Mutex::new(Staging::new(config.staging_capacity)),
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn run_ingestion(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.ingest_interval_ms));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %self.id, "Ingestion loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.ingest_tick().await {
                        tracing::error!(worker_id = %self.id, error = %e, "Ingestion tick failed");
                    }
                }
            }
        }
    }

    pub async fn run_execution(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.execute_interval_ms));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %self.id, "Execution loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.execute_tick().await {
                        tracing::error!(worker_id = %self.id, error = %e, "Execution tick failed");
                    }
                }
            }
        }
    }

    pub async fn run_heartbeat(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %self.id, "Heartbeat loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.heartbeat_tick().await {
                        tracing::error!(worker_id = %self.id, error = %e, "Heartbeat tick failed");
                    }
                }
            }
        }
    }

    /// Pull candidates from the fast queue and the store fallback into the
    /// staging area. Returns how many jobs were newly staged.
    pub async fn ingest_tick(&self) -> Result<usize> {
        let now = Utc::now();
        let mut staged = 0;

        for queue_type in QueueType::ALL {
            for _ in 0..self.config.pop_batch {
                let id = match self.queue.pop(queue_type).await {
                    Ok(Some(id)) => id,
                    Ok(None) => break,
                    Err(e) => {
                        // Outage: the store fallback below still makes
                        // progress, and un-popped entries survive.
                        tracing::debug!(worker_id = %self.id, queue = %queue_type, error = %e, "Fast queue pop failed");
                        break;
                    }
                };

                let Some(job) = self.store.get(id).await? else {
                    tracing::debug!(job_id = %id, "Popped id for unknown job, dropping");
                    continue;
                };
                if job.state != JobState::Pending {
                    continue;
                }
                if self.staging.lock().await.offer(&job) {
                    staged += 1;
                }
            }
        }

        // Fallback for entries the fast queue silently lost or never got.
        for job in self
            .store
            .fallback_candidates(now, self.config.fallback_batch)
            .await?
        {
            if self.staging.lock().await.offer(&job) {
                staged += 1;
            }
        }

        Ok(staged)
    }

    /// Claim and execute up to one batch of due staged jobs. Returns how
    /// many jobs were actually executed (claims won).
    pub async fn execute_tick(&self) -> Result<usize> {
        let mut executed = 0;

        for _ in 0..self.config.execute_batch {
            let staged = {
                let mut staging = self.staging.lock().await;
                staging.pop_due(Utc::now())
            };
            let Some(staged) = staged else { break };

            let lease_until =
                Utc::now() + chrono::Duration::seconds(self.config.lease_duration_secs as i64);
            let claim = self
                .store
                .update_in_state(staged.id, JobState::Pending, JobMutation::claim(&self.id, lease_until))
                .await;

            match claim {
                Ok(Some(job)) => {
                    self.process(job).await;
                    executed += 1;
                }
                Ok(None) => {
                    // Lost the claim race; another actor owns the job now.
                    tracing::debug!(worker_id = %self.id, job_id = %staged.id, "Claim lost, discarding local copy");
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.id, job_id = %staged.id, error = %e, "Claim attempt failed");
                }
            }

            self.staging.lock().await.forget(&staged.id);
        }

        Ok(executed)
    }

    /// Extend the lease of every running job this worker owns.
    pub async fn heartbeat_tick(&self) -> Result<usize> {
        let now = Utc::now();
        let lease_until = now + chrono::Duration::seconds(self.config.lease_duration_secs as i64);
        let owned = self.store.running_owned_by(&self.id).await?;
        let mut extended = 0;

        for job in owned {
            match self
                .store
                .update_in_state(job.id, JobState::Running, JobMutation::extend_lease(lease_until, now))
                .await
            {
                Ok(Some(_)) => extended += 1,
                Ok(None) => {
                    tracing::debug!(job_id = %job.id, "Job no longer running, heartbeat skipped");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Lease extension failed");
                }
            }
        }

        Ok(extended)
    }

    /// Dispatch one claimed job and settle the attempt. The dispatch is
    /// wrapped so the store is updated exactly once per attempt even if
    /// the executor aborts instead of reporting an outcome.
    async fn process(&self, job: Job) {
        let started = Utc::now();
        tracing::info!(
            worker_id = %self.id,
            job_id = %job.id,
            queue = %job.queue_type,
            task_type = %job.task_type,
            priority = job.priority,
            "Executing job"
        );

        let dispatch = AssertUnwindSafe(self.executor.execute(&job.task_type, &job.payload))
            .catch_unwind()
            .await;
        let outcome = match dispatch {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Failure {
                error: "task aborted: executor panicked".to_string(),
            },
        };

        let finished = Utc::now();
        let attempt_number = job.attempts + 1;
        let duration_ms = (finished - started).num_milliseconds();

        match outcome {
            TaskOutcome::Success => {
                match self
                    .store
                    .update_in_state(job.id, JobState::Running, JobMutation::succeed())
                    .await
                {
                    Ok(Some(_)) => {
                        tracing::info!(job_id = %job.id, "Job completed successfully");
                    }
                    Ok(None) => {
                        tracing::warn!(job_id = %job.id, "Job was taken over before success could be recorded");
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "Failed to record success");
                    }
                }
                self.record_attempt(&job, attempt_number, started, finished, duration_ms, AttemptOutcome::Succeeded, None)
                    .await;
            }
            TaskOutcome::Failure { error } => {
                if attempt_number < job.max_attempts {
                    let delay = backoff_delay_secs(self.config.retry_initial_delay_secs, attempt_number);
                    let next_attempt_at = finished + chrono::Duration::seconds(delay as i64);
                    let result = self
                        .store
                        .update_in_state(
                            job.id,
                            JobState::Running,
                            JobMutation::retry(attempt_number, next_attempt_at, error.clone()),
                        )
                        .await;
                    match result {
                        Ok(Some(_)) => {
                            tracing::info!(
                                job_id = %job.id,
                                attempts = attempt_number,
                                delay_secs = delay,
                                "Job failed, retry scheduled"
                            );
                        }
                        Ok(None) => {
                            tracing::warn!(job_id = %job.id, "Job was taken over before retry could be recorded");
                        }
                        Err(e) => {
                            tracing::error!(job_id = %job.id, error = %e, "Failed to record retry");
                        }
                    }
                    self.record_attempt(&job, attempt_number, started, finished, duration_ms, AttemptOutcome::Failed, Some(error))
                        .await;
                } else {
                    let result = self
                        .store
                        .update_in_state(
                            job.id,
                            JobState::Running,
                            JobMutation::dead(attempt_number, error.clone()),
                        )
                        .await;
                    match result {
                        Ok(Some(_)) => {
                            tracing::warn!(job_id = %job.id, attempts = attempt_number, "Job permanently failed");
                        }
                        Ok(None) => {
                            tracing::warn!(job_id = %job.id, "Job was taken over before dead-letter could be recorded");
                        }
                        Err(e) => {
                            tracing::error!(job_id = %job.id, error = %e, "Failed to record dead-letter");
                        }
                    }
                    self.record_attempt(&job, attempt_number, started, finished, duration_ms, AttemptOutcome::Exhausted, Some(error))
                        .await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_attempt(
        &self,
        job: &Job,
        attempt_number: u32,
        started_at: chrono::DateTime<Utc>,
        finished_at: chrono::DateTime<Utc>,
        duration_ms: i64,
        outcome: AttemptOutcome,
        error: Option<String>,
    ) {
        self.attempts
            .record(AttemptRecord {
                job_id: job.id,
                attempt_number,
                started_at,
                finished_at,
                outcome,
                worker_id: self.id.clone(),
                duration_ms,
                error,
            })
            .await;
    }
}
