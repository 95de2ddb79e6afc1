//! Per-channel delivery routing.

use std::sync::Arc;

use thiserror::Error;

use crate::directory::{ContactDirectory, DirectoryError};
use crate::event::NotificationEvent;
use crate::metrics::ChannelMetrics;
use crate::queue::{DeliveryJob, DeliveryQueue, JobTarget, QueueError};
use crate::sink::{InAppSink, LiveBroadcaster, RenderedNotification, SinkError};
use crate::template;

use super::Channel;

/// Errors raised inside a single channel attempt. The orchestrator catches
/// these at the channel boundary; they never cross `emit`.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// What happened for one channel of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Written to the in-app feed
    Pushed,
    /// Pushed to at least one live connection
    PushedLive,
    /// No live connection; attempt was harmless
    NoLiveConnection,
    /// Websocket skipped because in-app already delivers to the same
    /// live-feed surface
    SkippedDuplicateSurface,
    /// No email address on file
    SkippedNoAddress,
    /// No active webhook endpoints subscribed to this event type
    SkippedNoEndpoints,
    /// Jobs handed to the channel's delivery queue
    Enqueued { jobs: usize },
}

/// Routes one admitted event to one channel.
///
/// Every dependency is injected so tests can observe each surface
/// independently.
pub struct ChannelRouter {
    in_app: Arc<dyn InAppSink>,
    live: Arc<dyn LiveBroadcaster>,
    directory: Arc<dyn ContactDirectory>,
    email_queue: Arc<dyn DeliveryQueue>,
    webhook_queue: Arc<dyn DeliveryQueue>,
}

impl ChannelRouter {
    pub fn new(
        in_app: Arc<dyn InAppSink>,
        live: Arc<dyn LiveBroadcaster>,
        directory: Arc<dyn ContactDirectory>,
        email_queue: Arc<dyn DeliveryQueue>,
        webhook_queue: Arc<dyn DeliveryQueue>,
    ) -> Self {
        Self {
            in_app,
            live,
            directory,
            email_queue,
            webhook_queue,
        }
    }

    /// Route the event to one channel.
    ///
    /// `in_app_active` tells the websocket branch whether the in-app feed
    /// is also delivering this event, so the same live surface is not
    /// written twice.
    pub async fn route(
        &self,
        event: &NotificationEvent,
        channel: Channel,
        in_app_active: bool,
    ) -> Result<DeliveryOutcome, RouteError> {
        match channel {
            Channel::InApp => self.route_in_app(event).await,
            Channel::Websocket => self.route_websocket(event, in_app_active).await,
            Channel::Email => self.route_email(event).await,
            Channel::Webhook => self.route_webhook(event).await,
        }
    }

    async fn route_in_app(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, RouteError> {
        let rendered = RenderedNotification::from_event(event);
        self.in_app.push(&event.recipient_id, rendered).await?;
        Ok(DeliveryOutcome::Pushed)
    }

    async fn route_websocket(
        &self,
        event: &NotificationEvent,
        in_app_active: bool,
    ) -> Result<DeliveryOutcome, RouteError> {
        if in_app_active {
            // In-app and websocket feed the same surface
            return Ok(DeliveryOutcome::SkippedDuplicateSurface);
        }

        let rendered = RenderedNotification::from_event(event);
        let received = self
            .live
            .push_if_connected(&event.recipient_id, rendered)
            .await?;

        Ok(if received {
            DeliveryOutcome::PushedLive
        } else {
            DeliveryOutcome::NoLiveConnection
        })
    }

    async fn route_email(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, RouteError> {
        let address = match self.directory.email_address_of(&event.recipient_id).await? {
            Some(address) => address,
            None => {
                tracing::debug!(
                    recipient_id = %event.recipient_id,
                    event_type = %event.event_type,
                    "No email address on file, skipping email channel"
                );
                return Ok(DeliveryOutcome::SkippedNoAddress);
            }
        };

        let job = DeliveryJob::new(
            event.id,
            event.recipient_id.clone(),
            JobTarget::Email {
                address,
                template_id: template::template_for(event.event_type).to_string(),
            },
            serde_json::to_value(RenderedNotification::from_event(event))?,
            event.severity,
        );

        if let Err(e) = self.email_queue.enqueue(job).await {
            ChannelMetrics::record_rejected(Channel::Email.as_str());
            return Err(e.into());
        }
        ChannelMetrics::record_enqueued(Channel::Email.as_str());
        Ok(DeliveryOutcome::Enqueued { jobs: 1 })
    }

    async fn route_webhook(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, RouteError> {
        let endpoints = self
            .directory
            .active_webhooks_for(&event.recipient_id, event.event_type)
            .await?;

        if endpoints.is_empty() {
            tracing::debug!(
                recipient_id = %event.recipient_id,
                event_type = %event.event_type,
                "No active webhook endpoints, skipping webhook channel"
            );
            return Ok(DeliveryOutcome::SkippedNoEndpoints);
        }

        let payload = serde_json::to_value(RenderedNotification::from_event(event))?;

        // Each endpoint is an independent delivery; a failed enqueue stops
        // the remaining endpoints only because the queue itself is down
        let mut enqueued = 0;
        for endpoint in endpoints {
            let job = DeliveryJob::new(
                event.id,
                event.recipient_id.clone(),
                JobTarget::Webhook {
                    endpoint_id: endpoint.id,
                    url: endpoint.url,
                    secret: endpoint.secret,
                },
                payload.clone(),
                event.severity,
            );
            self.enqueue_webhook_job(job).await?;
            enqueued += 1;
        }

        Ok(DeliveryOutcome::Enqueued { jobs: enqueued })
    }

    async fn enqueue_webhook_job(&self, job: DeliveryJob) -> Result<(), QueueError> {
        if let Err(e) = self.webhook_queue.enqueue(job).await {
            ChannelMetrics::record_rejected(Channel::Webhook.as_str());
            return Err(e);
        }
        ChannelMetrics::record_enqueued(Channel::Webhook.as_str());
        Ok(())
    }
}
