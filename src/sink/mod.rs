//! Synchronous delivery sinks.
//!
//! The in-app feed and the live-connection broadcaster are the two
//! surfaces the engine writes to directly; both are external
//! collaborators behind traits so tests can observe deliveries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::event::{Category, EventType, NotificationEvent, Severity};

/// Errors a sink push can produce.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink backend unreachable or rejected the write
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// The rendered form of a notification handed to sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedNotification {
    pub id: Uuid,
    pub event_type: EventType,
    pub category: Category,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RenderedNotification {
    pub fn from_event(event: &NotificationEvent) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            category: event.category,
            severity: event.severity,
            title: event.title.clone(),
            message: event.message.clone(),
            payload: event.payload.clone(),
            created_at: event.created_at,
        }
    }
}

/// Persistent in-app notification feed.
#[async_trait]
pub trait InAppSink: Send + Sync {
    /// Append to the recipient's feed.
    async fn push(
        &self,
        recipient_id: &str,
        notification: RenderedNotification,
    ) -> Result<(), SinkError>;
}

/// Best-effort push to a live connection, if one exists.
#[async_trait]
pub trait LiveBroadcaster: Send + Sync {
    /// Push to the recipient's live connections. Returns whether any
    /// connection received it; having none is not an error.
    async fn push_if_connected(
        &self,
        recipient_id: &str,
        notification: RenderedNotification,
    ) -> Result<bool, SinkError>;
}
