use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use chronoqueue::attempt::AttemptLog;
use chronoqueue::config::EngineConfig;
use chronoqueue::job::{Job, JobState, NewJob, QueueType};
use chronoqueue::queue::{FastQueue, MemoryQueue};
use chronoqueue::recovery::RecoveryService;
use chronoqueue::scheduler::Scheduler;
use chronoqueue::store::{JobStore, MemoryStore};
use chronoqueue::worker::{TaskExecutor, TaskOutcome, Worker};

struct AlwaysSucceeds;

#[async_trait::async_trait]
impl TaskExecutor for AlwaysSucceeds {
    async fn execute(&self, _task_type: &str, _payload: &serde_json::Value) -> TaskOutcome {
        TaskOutcome::Success
    }
}

async fn seed_due(store: &Arc<MemoryStore>, queue: QueueType) -> Job {
    store
        .create(NewJob {
            queue_type: queue,
            task_type: "report".to_string(),
            payload: json!({}),
            metadata: None,
            scheduled_at: Some(Utc::now() - Duration::seconds(30)),
            priority: None,
            max_attempts: None,
            idempotency_key: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn rebuild_repushes_believed_queued_jobs() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let scheduler = Scheduler::new(store.clone(), queue.clone(), &EngineConfig::default());

    let job = seed_due(&store, QueueType::Report).await;
    scheduler.tick().await.unwrap();
    assert!(store.get(job.id).await.unwrap().unwrap().queued_at.is_some());

    // Crash: every fast-queue entry is lost, the store survives.
    queue.flush().await;
    assert!(queue.is_empty(QueueType::Report).await);

    let report = RecoveryService::new(store.clone(), queue.clone())
        .rebuild()
        .await
        .unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(queue.pop(QueueType::Report).await.unwrap(), Some(job.id));
}

#[tokio::test]
async fn rebuild_skips_jobs_not_believed_queued() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());

    // Never promoted: queued_at is null, the scheduler owns this one.
    let job = seed_due(&store, QueueType::Email).await;

    let report = RecoveryService::new(store.clone(), queue.clone())
        .rebuild()
        .await
        .unwrap();
    assert_eq!(report.recovered, 0);
    assert!(queue.is_empty(QueueType::Email).await);
    assert!(store.get(job.id).await.unwrap().unwrap().queued_at.is_none());
}

#[tokio::test]
async fn failed_recovery_push_clears_queued_marker() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let scheduler = Scheduler::new(store.clone(), queue.clone(), &EngineConfig::default());

    let job = seed_due(&store, QueueType::Email).await;
    scheduler.tick().await.unwrap();
    queue.flush().await;

    queue.set_available(false);
    let report = RecoveryService::new(store.clone(), queue.clone())
        .rebuild()
        .await
        .unwrap();
    assert_eq!(report.recovered, 0);
    assert_eq!(report.failed, 1);

    // The stale marker is gone, so the scheduler will re-promote.
    assert!(store.get(job.id).await.unwrap().unwrap().queued_at.is_none());
    queue.set_available(true);
    assert_eq!(scheduler.tick().await.unwrap(), 1);
    assert_eq!(queue.pop(QueueType::Email).await.unwrap(), Some(job.id));
}

#[tokio::test]
async fn double_rebuild_yields_one_execution() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let scheduler = Scheduler::new(store.clone(), queue.clone(), &EngineConfig::default());
    let attempts = Arc::new(AttemptLog::new());
    let worker = Worker::new(
        store.clone(),
        queue.clone(),
        Arc::new(AlwaysSucceeds),
        attempts.clone(),
        EngineConfig::default(),
    );

    let job = seed_due(&store, QueueType::Email).await;
    scheduler.tick().await.unwrap();
    queue.flush().await;

    // Recovery runs twice in a row: duplicate entries are fine.
    let recovery = RecoveryService::new(store.clone(), queue.clone());
    recovery.rebuild().await.unwrap();
    recovery.rebuild().await.unwrap();
    assert_eq!(queue.len(QueueType::Email).await, 2);

    worker.ingest_tick().await.unwrap();
    assert_eq!(worker.execute_tick().await.unwrap(), 1);
    assert_eq!(
        store.get(job.id).await.unwrap().unwrap().state,
        JobState::Succeeded
    );

    // Anything left is a stale hint that can never execute again.
    worker.ingest_tick().await.unwrap();
    assert_eq!(worker.execute_tick().await.unwrap(), 0);
    assert_eq!(attempts.for_job(job.id).await.len(), 1);
}
