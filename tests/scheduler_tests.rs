use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use chronoqueue::config::EngineConfig;
use chronoqueue::job::{JobState, NewJob, QueueType};
use chronoqueue::queue::{FastQueue, MemoryQueue};
use chronoqueue::scheduler::Scheduler;
use chronoqueue::store::{JobStore, MemoryStore};

fn due_spec(queue: QueueType) -> NewJob {
    NewJob {
        queue_type: queue,
        task_type: "send_email".to_string(),
        payload: json!({}),
        metadata: None,
        scheduled_at: Some(Utc::now() - Duration::seconds(10)),
        priority: None,
        max_attempts: None,
        idempotency_key: None,
    }
}

fn setup() -> (Arc<MemoryStore>, Arc<MemoryQueue>, Scheduler) {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let scheduler = Scheduler::new(store.clone(), queue.clone(), &EngineConfig::default());
    (store, queue, scheduler)
}

#[tokio::test]
async fn promotes_due_jobs_and_marks_them_queued() {
    let (store, queue, scheduler) = setup();
    let job = store.create(due_spec(QueueType::Email)).await.unwrap();

    let promoted = scheduler.tick().await.unwrap();
    assert_eq!(promoted, 1);

    let popped = queue.pop(QueueType::Email).await.unwrap();
    assert_eq!(popped, Some(job.id));

    let current = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(current.state, JobState::Pending);
    assert!(current.queued_at.is_some());
}

#[tokio::test]
async fn routes_jobs_to_their_queue_partition() {
    let (store, queue, scheduler) = setup();
    let email = store.create(due_spec(QueueType::Email)).await.unwrap();
    let report = store.create(due_spec(QueueType::Report)).await.unwrap();

    scheduler.tick().await.unwrap();

    assert_eq!(queue.pop(QueueType::Email).await.unwrap(), Some(email.id));
    assert_eq!(queue.pop(QueueType::Report).await.unwrap(), Some(report.id));
    assert_eq!(queue.pop(QueueType::Notification).await.unwrap(), None);
}

#[tokio::test]
async fn does_not_promote_future_or_already_queued_jobs() {
    let (store, queue, scheduler) = setup();

    let mut future = due_spec(QueueType::Email);
    future.scheduled_at = Some(Utc::now() + Duration::seconds(3600));
    store.create(future).await.unwrap();

    let due = store.create(due_spec(QueueType::Email)).await.unwrap();

    assert_eq!(scheduler.tick().await.unwrap(), 1);
    // Second tick: the due job is now marked queued, the other is not due.
    assert_eq!(scheduler.tick().await.unwrap(), 0);
    assert_eq!(queue.len(QueueType::Email).await, 1);

    let current = store.get(due.id).await.unwrap().unwrap();
    assert!(current.queued_at.is_some());
}

#[tokio::test]
async fn outage_leaves_queued_at_null_and_next_tick_recovers() {
    let (store, queue, scheduler) = setup();
    let job = store.create(due_spec(QueueType::Email)).await.unwrap();

    queue.set_available(false);
    assert_eq!(scheduler.tick().await.unwrap(), 0);

    let current = store.get(job.id).await.unwrap().unwrap();
    assert!(current.queued_at.is_none(), "queued_at must stay null through the outage");
    assert!(queue.is_empty(QueueType::Email).await || queue.pop(QueueType::Email).await.is_err());

    // First tick after the queue comes back promotes the job.
    queue.set_available(true);
    assert_eq!(scheduler.tick().await.unwrap(), 1);

    let current = store.get(job.id).await.unwrap().unwrap();
    assert!(current.queued_at.is_some());
    assert_eq!(queue.pop(QueueType::Email).await.unwrap(), Some(job.id));
}

#[tokio::test]
async fn concurrent_schedulers_may_duplicate_but_never_lose() {
    let (store, queue, _) = setup();
    let config = EngineConfig::default();
    let a = Scheduler::new(store.clone(), queue.clone(), &config);
    let b = Scheduler::new(store.clone(), queue.clone(), &config);
    let job = store.create(due_spec(QueueType::Email)).await.unwrap();

    let (ra, rb) = tokio::join!(a.tick(), b.tick());
    ra.unwrap();
    rb.unwrap();

    // Push-before-persist allows duplicates; the job id must appear at
    // least once and the durable marker must be set.
    let mut seen = 0;
    while let Some(id) = queue.pop(QueueType::Email).await.unwrap() {
        assert_eq!(id, job.id);
        seen += 1;
    }
    assert!(seen >= 1);
    assert!(store.get(job.id).await.unwrap().unwrap().queued_at.is_some());
}
