//! Delivery jobs and priority work queues.
//!
//! The engine produces one `DeliveryJob` per admitted asynchronous channel
//! attempt and assigns its priority; external workers consume the queues
//! and own the outcome from there. Jobs dequeue in severity order, not
//! strictly arrival order.

mod memory;

pub use memory::MemoryDeliveryQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::event::Severity;

/// Errors that can occur during enqueue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue is at capacity
    #[error("Queue full (capacity: {capacity})")]
    Full { capacity: usize },

    /// Queue backend unreachable
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// Job could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Numeric job priority derived from event severity.
/// Lower value dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobPriority(pub u8);

impl JobPriority {
    pub fn from_severity(severity: Severity) -> Self {
        Self(severity.job_priority())
    }
}

/// Channel-specific delivery target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobTarget {
    /// Email delivery via the mail worker
    Email {
        address: String,
        template_id: String,
    },
    /// Webhook delivery via the webhook worker
    Webhook {
        endpoint_id: String,
        url: String,
        secret: String,
    },
}

/// A unit of asynchronous delivery work.
///
/// Enqueued once; ownership passes to the external worker. The engine has
/// no further knowledge of its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    /// Fresh identifier for this job
    pub id: Uuid,
    /// The notification this job delivers
    pub notification_id: Uuid,
    /// Recipient the job is for
    pub recipient_id: String,
    /// Where and how to deliver
    pub target: JobTarget,
    /// Rendered payload for the worker's template engine
    pub payload: serde_json::Value,
    /// Dequeue priority
    pub priority: JobPriority,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl DeliveryJob {
    pub fn new(
        notification_id: Uuid,
        recipient_id: impl Into<String>,
        target: JobTarget,
        payload: serde_json::Value,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id,
            recipient_id: recipient_id.into(),
            target,
            payload,
            priority: JobPriority::from_severity(severity),
            created_at: Utc::now(),
        }
    }
}

/// Statistics about a delivery queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub rejected: u64,
}

/// Outbound queue contract.
///
/// Implementations must be thread-safe (`Send + Sync`); many emit tasks
/// enqueue concurrently.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Hand a job to the queue. Returning `Err` means the job was not
    /// accepted; the caller logs and moves on.
    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError>;

    /// Current queue depth.
    async fn len(&self) -> usize;

    /// Current statistics.
    async fn stats(&self) -> QueueStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_severity() {
        assert!(
            JobPriority::from_severity(Severity::Critical)
                < JobPriority::from_severity(Severity::Warning)
        );
        assert!(
            JobPriority::from_severity(Severity::Warning)
                < JobPriority::from_severity(Severity::Info)
        );
    }

    #[test]
    fn test_job_target_serialization() {
        let target = JobTarget::Webhook {
            endpoint_id: "ep-1".into(),
            url: "https://example.com/hook".into(),
            secret: "s".into(),
        };
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["type"], "webhook");
    }
}
