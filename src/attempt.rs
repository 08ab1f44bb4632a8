//! Per-attempt audit trail.
//!
//! Purely an observability sink: the scheduling core never reads it and
//! correctness does not depend on it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::job::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    /// Failed and exhausted the retry budget; the job went dead.
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub job_id: JobId,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub worker_id: String,
    pub duration_ms: i64,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct AttemptLog {
    entries: RwLock<HashMap<JobId, Vec<AttemptRecord>>>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: AttemptRecord) {
        self.entries
            .write()
            .await
            .entry(record.job_id)
            .or_default()
            .push(record);
    }

    pub async fn for_job(&self, id: JobId) -> Vec<AttemptRecord> {
        self.entries.read().await.get(&id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn records_accumulate_per_job() {
        let log = AttemptLog::new();
        let job_id = Uuid::new_v4();
        let now = Utc::now();

        for n in 1..=2 {
            log.record(AttemptRecord {
                job_id,
                attempt_number: n,
                started_at: now,
                finished_at: now,
                outcome: AttemptOutcome::Failed,
                worker_id: "worker-test".to_string(),
                duration_ms: 5,
                error: Some("boom".to_string()),
            })
            .await;
        }

        let records = log.for_job(job_id).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attempt_number, 1);
        assert_eq!(records[1].attempt_number, 2);
        assert!(log.for_job(Uuid::new_v4()).await.is_empty());
    }
}
