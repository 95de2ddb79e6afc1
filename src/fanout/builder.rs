//! Settings-driven engine assembly.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::channel::ChannelRouter;
use crate::config::Settings;
use crate::dedup::create_dedup_store;
use crate::directory::ContactDirectory;
use crate::error::Result;
use crate::preferences::{PreferenceResolver, PreferenceStore, ResolverConfig};
use crate::queue::{DeliveryQueue, MemoryDeliveryQueue};
use crate::ratelimit::create_rate_limiter;
use crate::redis::RedisPool;
use crate::sink::{InAppSink, LiveBroadcaster};
use crate::tasks::CleanupTask;

use super::NotificationEngine;

/// Assembles a `NotificationEngine` from settings plus the external
/// collaborators the embedding application owns.
///
/// Backends (dedup, rate limiting) and delivery queues are created from
/// settings; the preference store, contact directory, and sinks have no
/// default and must be supplied.
pub struct EngineBuilder {
    settings: Settings,
    preference_store: Arc<dyn PreferenceStore>,
    directory: Arc<dyn ContactDirectory>,
    in_app: Arc<dyn InAppSink>,
    live: Arc<dyn LiveBroadcaster>,
    email_queue: Option<Arc<dyn DeliveryQueue>>,
    webhook_queue: Option<Arc<dyn DeliveryQueue>>,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl EngineBuilder {
    pub fn new(
        settings: Settings,
        preference_store: Arc<dyn PreferenceStore>,
        directory: Arc<dyn ContactDirectory>,
        in_app: Arc<dyn InAppSink>,
        live: Arc<dyn LiveBroadcaster>,
    ) -> Self {
        Self {
            settings,
            preference_store,
            directory,
            in_app,
            live,
            email_queue: None,
            webhook_queue: None,
            shutdown: None,
        }
    }

    /// Replace the default in-memory email queue, e.g. with a broker-backed
    /// implementation.
    pub fn email_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.email_queue = Some(queue);
        self
    }

    /// Replace the default in-memory webhook queue.
    pub fn webhook_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.webhook_queue = Some(queue);
        self
    }

    /// Spawn the background maintenance sweep, stopped by the given
    /// shutdown signal. Requires a running Tokio runtime at `build`.
    pub fn with_maintenance(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<NotificationEngine> {
        let Self {
            settings,
            preference_store,
            directory,
            in_app,
            live,
            email_queue,
            webhook_queue,
            shutdown,
        } = self;

        let needs_redis =
            settings.dedup.backend == "redis" || settings.ratelimit.backend == "redis";
        let pool = if needs_redis {
            Some(Arc::new(RedisPool::new(settings.redis.clone())?))
        } else {
            None
        };

        let op_timeout_ms = settings.redis.op_timeout_ms;
        let dedup = create_dedup_store(&settings.dedup, pool.clone(), op_timeout_ms);
        let limiter = create_rate_limiter(&settings.ratelimit, pool, op_timeout_ms);

        let resolver = Arc::new(PreferenceResolver::new(
            preference_store,
            ResolverConfig {
                cache_ttl_seconds: settings.preferences.cache_ttl_seconds,
                lookup_timeout_ms: settings.preferences.lookup_timeout_ms,
            },
        ));

        let email_queue = email_queue
            .unwrap_or_else(|| Arc::new(MemoryDeliveryQueue::new(settings.queue.max_capacity)));
        let webhook_queue = webhook_queue
            .unwrap_or_else(|| Arc::new(MemoryDeliveryQueue::new(settings.queue.max_capacity)));

        let router = Arc::new(ChannelRouter::new(
            in_app,
            live,
            directory.clone(),
            email_queue,
            webhook_queue,
        ));

        if let Some(shutdown) = shutdown {
            let task = CleanupTask::new(
                dedup.clone(),
                limiter.clone(),
                resolver.clone(),
                settings.dedup.cleanup_interval_seconds,
                settings.ratelimit.cleanup_interval_seconds,
                shutdown,
            );
            tokio::spawn(task.run());
        }

        Ok(NotificationEngine::new(
            resolver,
            dedup,
            limiter,
            router,
            directory,
            settings.broadcast.batch_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::directory::{DirectoryError, WebhookEndpoint};
    use crate::event::{EventType, NotificationEvent};
    use crate::preferences::{RecipientPreferences, StoreError};
    use crate::sink::{RenderedNotification, SinkError};

    struct EmptyStore;

    #[async_trait]
    impl PreferenceStore for EmptyStore {
        async fn get(
            &self,
            _recipient_id: &str,
        ) -> Result<Option<RecipientPreferences>, StoreError> {
            Ok(None)
        }
    }

    struct NullDirectory;

    #[async_trait]
    impl ContactDirectory for NullDirectory {
        async fn email_address_of(
            &self,
            _recipient_id: &str,
        ) -> Result<Option<String>, DirectoryError> {
            Ok(None)
        }

        async fn active_webhooks_for(
            &self,
            _recipient_id: &str,
            _event_type: EventType,
        ) -> Result<Vec<WebhookEndpoint>, DirectoryError> {
            Ok(vec![])
        }

        async fn all_active_recipients(&self) -> Result<Vec<String>, DirectoryError> {
            Ok(vec![])
        }
    }

    struct NullSink;

    #[async_trait]
    impl crate::sink::InAppSink for NullSink {
        async fn push(
            &self,
            _recipient_id: &str,
            _notification: RenderedNotification,
        ) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct NullLive;

    #[async_trait]
    impl crate::sink::LiveBroadcaster for NullLive {
        async fn push_if_connected(
            &self,
            _recipient_id: &str,
            _notification: RenderedNotification,
        ) -> Result<bool, SinkError> {
            Ok(false)
        }
    }

    fn builder() -> EngineBuilder {
        EngineBuilder::new(
            Settings::default(),
            Arc::new(EmptyStore),
            Arc::new(NullDirectory),
            Arc::new(NullSink),
            Arc::new(NullLive),
        )
    }

    #[tokio::test]
    async fn test_default_settings_build_and_emit() {
        crate::telemetry::init_tracing();

        let engine = builder().build().unwrap();

        let event = NotificationEvent::builder(EventType::LiquidationWarning, "u1")
            .title("Position at risk")
            .build();
        assert!(engine.emit(event).await.is_delivered());
        assert_eq!(engine.stats().emitted, 1);
    }

    #[tokio::test]
    async fn test_maintenance_task_spawns_and_stops() {
        let (tx, rx) = broadcast::channel(1);
        let engine = builder().with_maintenance(rx).build().unwrap();

        let event = NotificationEvent::builder(EventType::PasswordChanged, "u1").build();
        assert!(engine.emit(event).await.is_delivered());

        tx.send(()).unwrap();
    }
}
