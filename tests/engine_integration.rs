//! End-to-end tests for the fan-out engine wired against in-memory
//! backends and fake external collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use meridian_notify::channel::{Channel, ChannelRouter};
use meridian_notify::dedup::{DedupStore, MemoryDedupStore, SuppressionWindows};
use meridian_notify::directory::{ContactDirectory, DirectoryError, WebhookEndpoint};
use meridian_notify::event::{EventType, NotificationEvent};
use meridian_notify::fanout::{
    BroadcastOutcome, BroadcastTemplate, ChannelResult, EmitOutcome, NotificationEngine,
};
use meridian_notify::preferences::{
    PreferenceResolver, PreferenceStore, RecipientPreferences, ResolverConfig, StoreError,
};
use meridian_notify::queue::{
    DeliveryJob, DeliveryQueue, MemoryDeliveryQueue, QueueError, QueueStats,
};
use meridian_notify::ratelimit::{LocalRateLimiter, RateLimitConfig};
use meridian_notify::sink::{InAppSink, LiveBroadcaster, RenderedNotification, SinkError};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    pushed: Mutex<Vec<(String, RenderedNotification)>>,
    fail_for: Option<String>,
}

impl RecordingSink {
    fn pushed_recipients(&self) -> Vec<String> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }
}

#[async_trait]
impl InAppSink for RecordingSink {
    async fn push(
        &self,
        recipient_id: &str,
        notification: RenderedNotification,
    ) -> Result<(), SinkError> {
        if self.fail_for.as_deref() == Some(recipient_id) {
            return Err(SinkError::Unavailable("injected sink failure".into()));
        }
        self.pushed
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), notification));
        Ok(())
    }
}

struct SilentLive;

#[async_trait]
impl LiveBroadcaster for SilentLive {
    async fn push_if_connected(
        &self,
        _recipient_id: &str,
        _notification: RenderedNotification,
    ) -> Result<bool, SinkError> {
        Ok(false)
    }
}

struct FakeDirectory {
    email: Option<String>,
    webhooks: Vec<WebhookEndpoint>,
    recipients: Vec<String>,
    fail_enumeration: bool,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        Self {
            email: Some("u1@example.com".into()),
            webhooks: vec![],
            recipients: vec![],
            fail_enumeration: false,
        }
    }
}

#[async_trait]
impl ContactDirectory for FakeDirectory {
    async fn email_address_of(
        &self,
        _recipient_id: &str,
    ) -> Result<Option<String>, DirectoryError> {
        Ok(self.email.clone())
    }

    async fn active_webhooks_for(
        &self,
        _recipient_id: &str,
        _event_type: EventType,
    ) -> Result<Vec<WebhookEndpoint>, DirectoryError> {
        Ok(self.webhooks.clone())
    }

    async fn all_active_recipients(&self) -> Result<Vec<String>, DirectoryError> {
        if self.fail_enumeration {
            return Err(DirectoryError::Unavailable("injected outage".into()));
        }
        Ok(self.recipients.clone())
    }
}

#[derive(Default)]
struct StaticPreferenceStore {
    prefs: HashMap<String, RecipientPreferences>,
}

#[async_trait]
impl PreferenceStore for StaticPreferenceStore {
    async fn get(&self, recipient_id: &str) -> Result<Option<RecipientPreferences>, StoreError> {
        Ok(self.prefs.get(recipient_id).cloned())
    }
}

/// Queue that rejects every job, simulating a broker outage.
struct BrokenQueue;

#[async_trait]
impl DeliveryQueue for BrokenQueue {
    async fn enqueue(&self, _job: DeliveryJob) -> Result<(), QueueError> {
        Err(QueueError::Unavailable("injected broker outage".into()))
    }

    async fn len(&self) -> usize {
        0
    }

    async fn stats(&self) -> QueueStats {
        QueueStats {
            depth: 0,
            capacity: 0,
            enqueued: 0,
            rejected: 0,
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    engine: NotificationEngine,
    in_app: Arc<RecordingSink>,
    email_queue: Arc<MemoryDeliveryQueue>,
    webhook_queue: Arc<MemoryDeliveryQueue>,
}

struct HarnessBuilder {
    directory: FakeDirectory,
    prefs: HashMap<String, RecipientPreferences>,
    rate_config: RateLimitConfig,
    sink_fail_for: Option<String>,
    broken_webhook_queue: bool,
    broadcast_batch_size: usize,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            directory: FakeDirectory::default(),
            prefs: HashMap::new(),
            rate_config: RateLimitConfig::default(),
            sink_fail_for: None,
            broken_webhook_queue: false,
            broadcast_batch_size: 100,
        }
    }

    fn prefs_for(mut self, recipient_id: &str, prefs: RecipientPreferences) -> Self {
        self.prefs.insert(recipient_id.to_string(), prefs);
        self
    }

    fn webhooks(mut self, endpoints: Vec<WebhookEndpoint>) -> Self {
        self.directory.webhooks = endpoints;
        self
    }

    fn broadcast_recipients(mut self, recipients: Vec<String>) -> Self {
        self.directory.recipients = recipients;
        self
    }

    fn fail_enumeration(mut self) -> Self {
        self.directory.fail_enumeration = true;
        self
    }

    fn rate_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_config = config;
        self
    }

    fn sink_fails_for(mut self, recipient_id: &str) -> Self {
        self.sink_fail_for = Some(recipient_id.to_string());
        self
    }

    fn broken_webhook_queue(mut self) -> Self {
        self.broken_webhook_queue = true;
        self
    }

    fn build(self) -> Harness {
        let in_app = Arc::new(RecordingSink {
            pushed: Mutex::new(vec![]),
            fail_for: self.sink_fail_for,
        });
        let email_queue = Arc::new(MemoryDeliveryQueue::new(1_000));
        let webhook_queue = Arc::new(MemoryDeliveryQueue::new(1_000));
        let directory = Arc::new(self.directory);

        let routed_webhook_queue: Arc<dyn DeliveryQueue> = if self.broken_webhook_queue {
            Arc::new(BrokenQueue)
        } else {
            webhook_queue.clone()
        };

        let router = Arc::new(ChannelRouter::new(
            in_app.clone(),
            Arc::new(SilentLive),
            directory.clone(),
            email_queue.clone(),
            routed_webhook_queue,
        ));

        let resolver = Arc::new(PreferenceResolver::new(
            Arc::new(StaticPreferenceStore { prefs: self.prefs }),
            ResolverConfig::default(),
        ));
        let dedup: Arc<dyn DedupStore> =
            Arc::new(MemoryDedupStore::new(SuppressionWindows::default()));
        let limiter = Arc::new(LocalRateLimiter::new(self.rate_config));

        let engine = NotificationEngine::new(
            resolver,
            dedup,
            limiter,
            router,
            directory,
            self.broadcast_batch_size,
        );

        Harness {
            engine,
            in_app,
            email_queue,
            webhook_queue,
        }
    }
}

fn liquidation_warning(recipient: &str, position: &str) -> NotificationEvent {
    NotificationEvent::builder(EventType::LiquidationWarning, recipient)
        .title("Position at risk of liquidation")
        .payload(json!({"position_id": position}))
        .dedup_key(format!("{recipient}:{position}"))
        .build()
}

fn channel_result(outcome: &EmitOutcome, channel: Channel) -> Option<ChannelResult> {
    match outcome {
        EmitOutcome::Routed { channels } => channels
            .iter()
            .find(|report| report.channel == channel)
            .map(|report| report.result.clone()),
        _ => None,
    }
}

// ============================================================================
// Deduplication and escalation
// ============================================================================

#[tokio::test]
async fn test_duplicate_event_suppressed_within_window() {
    let harness = HarnessBuilder::new().build();

    let first = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;
    assert!(first.is_delivered());

    let second = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;
    assert_eq!(second, EmitOutcome::DuplicateSuppressed);

    // Only the first event reached the feed
    assert_eq!(harness.in_app.pushed_recipients(), vec!["u1"]);
}

#[tokio::test]
async fn test_escalation_overrides_suppression_for_same_position() {
    let harness = HarnessBuilder::new().build();

    let warning = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;
    assert!(warning.is_delivered());

    let repeat = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;
    assert_eq!(repeat, EmitOutcome::DuplicateSuppressed);

    // The execution shares the position-scoped dedup key but ranks higher,
    // so it clears the warning's record and delivers
    let executed = NotificationEvent::builder(EventType::LiquidationExecuted, "u1")
        .title("Position liquidated")
        .dedup_key("u1:pos-42")
        .build();
    let outcome = harness.engine.emit(executed).await;
    assert!(outcome.is_delivered());

    assert_eq!(harness.in_app.pushed_recipients(), vec!["u1", "u1"]);
}

#[tokio::test]
async fn test_risk_ladder_steps_all_deliver() {
    let harness = HarnessBuilder::new().build();

    for event_type in [
        EventType::HealthFactorCaution,
        EventType::HealthFactorDanger,
        EventType::HealthFactorCritical,
    ] {
        let event = NotificationEvent::builder(event_type, "u1")
            .dedup_key("u1:pos-7")
            .build();
        let outcome = harness.engine.emit(event).await;
        assert!(outcome.is_delivered(), "{event_type} should deliver");
    }

    assert_eq!(harness.in_app.pushed_recipients().len(), 3);
}

#[tokio::test]
async fn test_deescalation_stays_suppressed() {
    let harness = HarnessBuilder::new().build();

    let critical = NotificationEvent::builder(EventType::HealthFactorCritical, "u1")
        .dedup_key("u1:pos-7")
        .build();
    assert!(harness.engine.emit(critical).await.is_delivered());

    // A milder reading for the same position never clears the record left
    // by the more severe one
    let caution = NotificationEvent::builder(EventType::HealthFactorCaution, "u1")
        .dedup_key("u1:pos-7")
        .build();
    assert_eq!(
        harness.engine.emit(caution).await,
        EmitOutcome::DuplicateSuppressed
    );
}

#[tokio::test]
async fn test_escalation_clears_default_keyed_records() {
    let harness = HarnessBuilder::new().build();

    // No explicit dedup keys: each type keys on recipient:type
    let danger = NotificationEvent::builder(EventType::HealthFactorDanger, "u1").build();
    assert!(harness.engine.emit(danger.clone()).await.is_delivered());

    let warning = NotificationEvent::builder(EventType::LiquidationWarning, "u1").build();
    assert!(harness.engine.emit(warning).await.is_delivered());

    // The danger record was invalidated by the higher-ranked warning, so a
    // fresh danger reading is admitted again rather than suppressed
    let danger_again = NotificationEvent::builder(EventType::HealthFactorDanger, "u1").build();
    assert!(harness.engine.emit(danger_again).await.is_delivered());
}

// ============================================================================
// Preference filtering
// ============================================================================

#[tokio::test]
async fn test_disabled_category_drops_event() {
    let harness = HarnessBuilder::new().build();

    // Governance is off in the default preference set
    let event = NotificationEvent::builder(EventType::GovernanceProposalCreated, "u1").build();
    assert_eq!(harness.engine.emit(event).await, EmitOutcome::CategoryDisabled);
    assert!(harness.in_app.pushed_recipients().is_empty());
}

#[tokio::test]
async fn test_system_category_ignores_category_toggles() {
    let mut prefs = RecipientPreferences::default();
    prefs.categories.financial = false;
    prefs.categories.auth = false;
    prefs.categories.compliance = false;
    prefs.categories.governance = false;

    let harness = HarnessBuilder::new().prefs_for("u1", prefs).build();

    let event = NotificationEvent::builder(EventType::SystemMaintenance, "u1")
        .title("Scheduled maintenance")
        .build();
    assert!(harness.engine.emit(event).await.is_delivered());
    assert_eq!(harness.in_app.pushed_recipients(), vec!["u1"]);
}

#[tokio::test]
async fn test_master_toggle_drops_everything_including_system() {
    let prefs = RecipientPreferences {
        enabled: false,
        ..Default::default()
    };
    let harness = HarnessBuilder::new().prefs_for("u1", prefs).build();

    let event = NotificationEvent::builder(EventType::SystemMaintenance, "u1").build();
    assert_eq!(
        harness.engine.emit(event).await,
        EmitOutcome::NoEligibleChannels
    );
    assert!(harness.in_app.pushed_recipients().is_empty());
}

#[tokio::test]
async fn test_requested_channels_intersect_with_preferences() {
    let harness = HarnessBuilder::new().build();

    // Webhook is disabled by default; only email survives the intersection
    let event = NotificationEvent::builder(EventType::KybApproved, "u1")
        .channels([Channel::Email, Channel::Webhook])
        .build();
    let outcome = harness.engine.emit(event).await;

    assert!(matches!(
        channel_result(&outcome, Channel::Email),
        Some(ChannelResult::Delivered(_))
    ));
    assert!(channel_result(&outcome, Channel::Webhook).is_none());
    assert_eq!(harness.email_queue.len().await, 1);
}

// ============================================================================
// Channel isolation
// ============================================================================

#[tokio::test]
async fn test_webhook_outage_does_not_block_other_channels() {
    let mut prefs = RecipientPreferences::default();
    prefs.channels.webhook = true;

    let harness = HarnessBuilder::new()
        .prefs_for("u1", prefs)
        .webhooks(vec![WebhookEndpoint {
            id: "ep-1".into(),
            url: "https://hooks.example.com/u1".into(),
            secret: "s1".into(),
        }])
        .broken_webhook_queue()
        .build();

    let outcome = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;

    assert_eq!(
        channel_result(&outcome, Channel::Webhook),
        Some(ChannelResult::Failed)
    );
    assert!(matches!(
        channel_result(&outcome, Channel::InApp),
        Some(ChannelResult::Delivered(_))
    ));
    assert_eq!(harness.in_app.pushed_recipients(), vec!["u1"]);
    assert_eq!(harness.email_queue.len().await, 1);
}

#[tokio::test]
async fn test_webhook_jobs_enqueued_per_endpoint() {
    let mut prefs = RecipientPreferences::default();
    prefs.channels.webhook = true;

    let harness = HarnessBuilder::new()
        .prefs_for("u1", prefs)
        .webhooks(vec![
            WebhookEndpoint {
                id: "ep-1".into(),
                url: "https://hooks.example.com/a".into(),
                secret: "s1".into(),
            },
            WebhookEndpoint {
                id: "ep-2".into(),
                url: "https://hooks.example.com/b".into(),
                secret: "s2".into(),
            },
        ])
        .build();

    let outcome = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;
    assert!(matches!(
        channel_result(&outcome, Channel::Webhook),
        Some(ChannelResult::Delivered(_))
    ));
    assert_eq!(harness.webhook_queue.len().await, 2);
}

#[tokio::test]
async fn test_sink_failure_does_not_block_email() {
    let harness = HarnessBuilder::new().sink_fails_for("u1").build();

    let outcome = harness.engine.emit(liquidation_warning("u1", "pos-42")).await;

    assert_eq!(
        channel_result(&outcome, Channel::InApp),
        Some(ChannelResult::Failed)
    );
    assert_eq!(harness.email_queue.len().await, 1);
}

// ============================================================================
// Rate limiting
// ============================================================================

fn tight_limits() -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        window_seconds: 3600,
        critical_per_window: 30,
        warning_per_window: 2,
        info_per_window: 1,
    }
}

#[tokio::test]
async fn test_email_budget_exhausts_independently_of_in_app() {
    let harness = HarnessBuilder::new().rate_config(tight_limits()).build();

    for i in 0..3 {
        let event = NotificationEvent::builder(EventType::LiquidationWarning, "u1")
            .dedup_key(format!("u1:pos-{i}"))
            .build();
        let outcome = harness.engine.emit(event).await;

        let email = channel_result(&outcome, Channel::Email);
        if i < 2 {
            assert!(matches!(email, Some(ChannelResult::Delivered(_))));
        } else {
            assert_eq!(email, Some(ChannelResult::RateLimited));
        }

        // In-app is exempt: delivered every time
        assert!(matches!(
            channel_result(&outcome, Channel::InApp),
            Some(ChannelResult::Delivered(_))
        ));
    }

    assert_eq!(harness.email_queue.len().await, 2);
    assert_eq!(harness.in_app.pushed_recipients().len(), 3);
}

#[tokio::test]
async fn test_severity_buckets_are_independent() {
    let harness = HarnessBuilder::new().rate_config(tight_limits()).build();

    // Exhaust the info budget on email
    let info = NotificationEvent::builder(EventType::KybApproved, "u1")
        .channels([Channel::Email])
        .dedup_key("u1:kyb-1")
        .build();
    assert!(harness.engine.emit(info).await.is_delivered());

    let info_again = NotificationEvent::builder(EventType::PasswordChanged, "u1")
        .channels([Channel::Email])
        .dedup_key("u1:pw-1")
        .build();
    let outcome = harness.engine.emit(info_again).await;
    assert_eq!(
        channel_result(&outcome, Channel::Email),
        Some(ChannelResult::RateLimited)
    );

    // A warning still goes through: separate severity bucket
    let warning = liquidation_warning("u1", "pos-1");
    let outcome = harness.engine.emit(warning).await;
    assert!(matches!(
        channel_result(&outcome, Channel::Email),
        Some(ChannelResult::Delivered(_))
    ));
}

// ============================================================================
// Batch and broadcast
// ============================================================================

#[tokio::test]
async fn test_batch_outcomes_are_independent() {
    let harness = HarnessBuilder::new().build();

    let outcomes = harness
        .engine
        .emit_batch(vec![
            NotificationEvent::builder(EventType::GovernanceProposalCreated, "u1").build(),
            liquidation_warning("u2", "pos-9"),
        ])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], EmitOutcome::CategoryDisabled);
    assert!(outcomes[1].is_delivered());
}

#[tokio::test]
async fn test_broadcast_batches_and_counts() {
    let recipients: Vec<String> = (0..250).map(|i| format!("u{i}")).collect();
    let harness = HarnessBuilder::new()
        .broadcast_recipients(recipients)
        .build();

    let template = BroadcastTemplate::new(EventType::SystemBroadcast)
        .title("Protocol upgrade")
        .message("Upgrade scheduled for next week");

    let outcome = harness.engine.emit_broadcast(template).await;
    let summary = match outcome {
        BroadcastOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(summary.recipients, 250);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.delivered, 250);
    assert_eq!(summary.suppressed, 0);
    assert_eq!(harness.in_app.pushed_recipients().len(), 250);
}

#[tokio::test]
async fn test_broadcast_one_failing_recipient_does_not_affect_others() {
    let recipients: Vec<String> = (0..150).map(|i| format!("u{i}")).collect();
    let harness = HarnessBuilder::new()
        .broadcast_recipients(recipients)
        .sink_fails_for("u75")
        .build();

    let template = BroadcastTemplate::new(EventType::SystemBroadcast).title("Notice");
    let outcome = harness.engine.emit_broadcast(template).await;
    assert!(matches!(outcome, BroadcastOutcome::Completed(_)));

    let pushed = harness.in_app.pushed_recipients();
    assert_eq!(pushed.len(), 149);
    assert!(!pushed.contains(&"u75".to_string()));
}

#[tokio::test]
async fn test_broadcast_aborts_when_enumeration_fails() {
    let harness = HarnessBuilder::new().fail_enumeration().build();

    let template = BroadcastTemplate::new(EventType::SystemBroadcast).title("Notice");
    assert_eq!(
        harness.engine.emit_broadcast(template).await,
        BroadcastOutcome::Aborted
    );
    assert!(harness.in_app.pushed_recipients().is_empty());
}

#[tokio::test]
async fn test_rebroadcast_suppressed_within_window() {
    let recipients: Vec<String> = (0..10).map(|i| format!("u{i}")).collect();
    let harness = HarnessBuilder::new()
        .broadcast_recipients(recipients)
        .build();

    let template = BroadcastTemplate::new(EventType::SystemBroadcast).title("Notice");

    let first = harness.engine.emit_broadcast(template.clone()).await;
    let BroadcastOutcome::Completed(first) = first else {
        panic!("first broadcast should complete");
    };
    assert_eq!(first.delivered, 10);

    // Same broadcast type again: every recipient's record is still live
    let second = harness.engine.emit_broadcast(template).await;
    let BroadcastOutcome::Completed(second) = second else {
        panic!("second broadcast should complete");
    };
    assert_eq!(second.suppressed, 10);
    assert_eq!(second.delivered, 0);
}

// ============================================================================
// Stats
// ============================================================================

#[tokio::test]
async fn test_engine_stats_track_outcomes() {
    let harness = HarnessBuilder::new().build();

    harness.engine.emit(liquidation_warning("u1", "pos-1")).await;
    harness.engine.emit(liquidation_warning("u1", "pos-1")).await;
    harness
        .engine
        .emit(NotificationEvent::builder(EventType::GovernanceProposalCreated, "u1").build())
        .await;

    let stats = harness.engine.stats();
    assert_eq!(stats.emitted, 3);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.filtered, 1);
}
