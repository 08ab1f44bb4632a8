use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ChronoError, Result};

pub type JobId = Uuid;

pub const DEFAULT_PRIORITY: i32 = 100;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Job created, waiting to be claimed.
    Pending,
    /// Job is currently held under lease by a worker.
    Running,
    /// Job completed successfully. Terminal.
    Succeeded,
    /// Job failed but is eligible for retry. The execution path moves
    /// retryable failures straight back to `Pending`; this state exists
    /// for store filters and API parity.
    Failed,
    /// Job permanently failed after exhausting its retry budget. Terminal.
    Dead,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Dead)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
            JobState::Dead => write!(f, "dead"),
        }
    }
}

/// The closed set of dispatch lanes. Each lane maps to one fast-queue
/// partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    Email,
    Notification,
    Report,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Email, QueueType::Notification, QueueType::Report];
}

impl std::fmt::Display for QueueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueType::Email => write!(f, "email"),
            QueueType::Notification => write!(f, "notification"),
            QueueType::Report => write!(f, "report"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

/// Stored backoff configuration. Advisory only: the worker's exponential
/// formula is authoritative and does not consult this field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    pub initial_delay_seconds: u64,
    pub max_delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial_delay_seconds: 60,
            max_delay_seconds: 86_400,
        }
    }
}

/// Submission-side job specification. Thin input to [`Job::from_spec`];
/// optional fields fall back to the stored defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub queue_type: QueueType,
    pub task_type: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl NewJob {
    /// Reject specs that could never yield a consistent job.
    pub fn validate(&self) -> Result<()> {
        if self.task_type.trim().is_empty() {
            return Err(ChronoError::InvalidSpec(
                "task_type cannot be empty".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(ChronoError::InvalidSpec(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The unit of work tracked by the durable store.
///
/// Field invariants:
/// - `owner_worker_id` and `lease_expires_at` are set together and cleared
///   together: a job is either fully claimed or fully free.
/// - `queued_at` is non-null only while `state` is `Pending`; every
///   transition into or out of `Pending` clears it so the scheduler
///   re-considers the job.
/// - `attempts <= max_attempts`, and `Dead` requires `attempts == max_attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue_type: QueueType,
    pub task_type: String,
    pub payload: Value,
    pub metadata: Value,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: JobState,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub idempotency_key: Option<String>,
    pub queued_at: Option<DateTime<Utc>>,
    pub retry_backoff: RetryPolicy,
    pub last_error: Option<String>,
    pub last_error_payload: Value,
    pub owner_worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl Job {
    /// Build a fresh `Pending` job from a submission spec.
    pub fn from_spec(spec: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            queue_type: spec.queue_type,
            task_type: spec.task_type,
            payload: spec.payload,
            metadata: spec.metadata.unwrap_or_else(|| Value::Object(Default::default())),
            scheduled_at: spec.scheduled_at.unwrap_or(now),
            created_at: now,
            updated_at: now,
            state: JobState::Pending,
            priority: spec.priority.unwrap_or(DEFAULT_PRIORITY),
            attempts: 0,
            // A zero budget would let `attempts` overshoot `max_attempts`
            // on the first failure; clamp so the invariant holds even for
            // jobs created without going through validation.
            max_attempts: spec.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            idempotency_key: spec.idempotency_key,
            queued_at: None,
            retry_backoff: RetryPolicy::default(),
            last_error: None,
            last_error_payload: Value::Object(Default::default()),
            owner_worker_id: None,
            lease_expires_at: None,
            heartbeat_at: None,
            archived: false,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.owner_worker_id.is_some()
    }

    /// Lease/owner invariant check, used by tests and the store.
    pub fn lease_fields_consistent(&self) -> bool {
        self.owner_worker_id.is_some() == self.lease_expires_at.is_some()
    }
}
