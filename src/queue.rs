//! Fast dispatch queue contract and in-memory implementation.
//!
//! The fast queue is a hint layer over the store, never a source of truth:
//! entries may be duplicated or lost, and unreachability is a recoverable
//! error the caller retries on a later tick.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ChronoError, Result};
use crate::job::{JobId, QueueType};

#[async_trait]
pub trait FastQueue: Send + Sync {
    /// Push a job id onto the partition for its queue-type.
    async fn push(&self, queue: QueueType, id: JobId) -> Result<()>;

    /// Pop the oldest id from a partition, if any.
    async fn pop(&self, queue: QueueType) -> Result<Option<JobId>>;
}

/// Volatile FIFO partitions behind one mutex. `set_available(false)`
/// simulates an outage and `flush` simulates a crash that loses every
/// entry; both are exercised by the recovery and outage tests.
#[derive(Default)]
pub struct MemoryQueue {
    partitions: Mutex<HashMap<QueueType, VecDeque<JobId>>>,
    unavailable: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Drop every queued entry, as a crash of the queue process would.
    pub async fn flush(&self) {
        self.partitions.lock().await.clear();
    }

    pub async fn len(&self, queue: QueueType) -> usize {
        self.partitions
            .lock()
            .await
            .get(&queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, queue: QueueType) -> bool {
        self.len(queue).await == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChronoError::QueueUnavailable(
                "fast queue is unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FastQueue for MemoryQueue {
    async fn push(&self, queue: QueueType, id: JobId) -> Result<()> {
        self.check_available()?;
        self.partitions
            .lock()
            .await
            .entry(queue)
            .or_default()
            .push_back(id);
        Ok(())
    }

    async fn pop(&self, queue: QueueType) -> Result<Option<JobId>> {
        self.check_available()?;
        Ok(self
            .partitions
            .lock()
            .await
            .get_mut(&queue)
            .and_then(VecDeque::pop_front))
    }
}
