//! Identity and contact directory contract.
//!
//! The directory is an external collaborator: it owns recipient contact
//! data and webhook endpoint registrations. The engine only reads from it,
//! and treats every absence (no address, no endpoints) as a silent skip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EventType;

/// Errors a directory lookup can produce.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Directory backend unreachable or timed out
    #[error("Contact directory unavailable: {0}")]
    Unavailable(String),
}

/// A webhook endpoint registered by a recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub url: String,
    /// Shared secret the worker uses to sign the payload
    pub secret: String,
}

/// External identity/contact directory contract.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Email address for a recipient, `None` when unknown.
    async fn email_address_of(&self, recipient_id: &str)
        -> Result<Option<String>, DirectoryError>;

    /// Active webhook endpoints subscribed to the given event type.
    async fn active_webhooks_for(
        &self,
        recipient_id: &str,
        event_type: EventType,
    ) -> Result<Vec<WebhookEndpoint>, DirectoryError>;

    /// All currently active recipients, for broadcast expansion.
    async fn all_active_recipients(&self) -> Result<Vec<String>, DirectoryError>;
}
