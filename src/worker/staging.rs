use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};

use crate::job::{Job, JobId};

/// Heap entry ordered so the greatest element is the job due soonest
/// (earliest `scheduled_at`, highest priority on ties).
#[derive(Debug, Clone)]
pub struct StagedJob {
    pub id: JobId,
    pub scheduled_at: DateTime<Utc>,
    pub priority: i32,
}

impl PartialEq for StagedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StagedJob {}

impl PartialOrd for StagedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StagedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Worker-local staging area: a bounded priority container plus the
/// in-flight id set that prevents staging the same job twice within one
/// worker. Owned by the worker instance and shared between its ingestion
/// and execution loops behind a single mutex.
pub struct Staging {
    heap: BinaryHeap<StagedJob>,
    in_flight: HashSet<JobId>,
    capacity: usize,
}

impl Staging {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            in_flight: HashSet::new(),
            capacity,
        }
    }

    /// Stage a job unless it is already in flight or the container is at
    /// capacity. Returns whether the job was staged.
    pub fn offer(&mut self, job: &Job) -> bool {
        if self.in_flight.contains(&job.id) || self.heap.len() >= self.capacity {
            return false;
        }
        self.in_flight.insert(job.id);
        self.heap.push(StagedJob {
            id: job.id,
            scheduled_at: job.scheduled_at,
            priority: job.priority,
        });
        true
    }

    /// Take the highest-priority staged job if it is due at `now`. A
    /// not-yet-due head means nothing behind it is due either, so the
    /// caller stops for this tick. The id stays in the in-flight set until
    /// [`Staging::forget`] is called after the attempt resolves.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<StagedJob> {
        match self.heap.peek() {
            Some(head) if head.scheduled_at <= now => self.heap.pop(),
            _ => None,
        }
    }

    /// Release an id after its attempt resolved (or its claim was lost) so
    /// a future retry can be staged again.
    pub fn forget(&mut self, id: &JobId) {
        self.in_flight.remove(id);
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
