//! In-memory priority delivery queue.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DeliveryJob, DeliveryQueue, QueueError, QueueStats};

/// Heap entry ordered by (priority, arrival). BinaryHeap is a max-heap, so
/// comparisons are reversed: the lowest priority value and earliest
/// sequence number sit at the top.
struct QueuedJob {
    job: DeliveryJob,
    seq: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.job.priority == other.job.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .job
            .priority
            .cmp(&self.job.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

/// In-memory priority queue for delivery jobs.
///
/// Serves single-process deployments and tests; production deployments
/// typically substitute a broker-backed implementation of `DeliveryQueue`.
/// Workers drain with `dequeue`, receiving jobs in priority order and FIFO
/// within a priority level.
pub struct MemoryDeliveryQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    capacity: usize,
    next_seq: AtomicU64,
    enqueued: AtomicU64,
    rejected: AtomicU64,
}

impl MemoryDeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity,
            next_seq: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take the highest-priority job, if any.
    pub async fn dequeue(&self) -> Option<DeliveryJob> {
        self.heap.lock().await.pop().map(|entry| entry.job)
    }
}

#[async_trait]
impl DeliveryQueue for MemoryDeliveryQueue {
    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError> {
        let mut heap = self.heap.lock().await;

        if heap.len() >= self.capacity {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        heap.push(QueuedJob { job, seq });
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    async fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.heap.lock().await.len(),
            capacity: self.capacity,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
