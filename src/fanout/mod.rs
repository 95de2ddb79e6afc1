//! Fan-out orchestrator.
//!
//! `NotificationEngine` is the entry point for the engine: it sequences
//! preference resolution, category/channel filtering, escalation clearing,
//! dedup admission, per-channel rate limiting, and routing for one event,
//! many events, or a broadcast to all active recipients.
//!
//! Emission is fire-and-forget: no failure on the delivery side ever
//! reaches the caller. Every failure path is logged with enough context
//! (event type, recipient, channel) to diagnose, and counted in metrics.

mod builder;

pub use builder::EngineBuilder;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::channel::{
    category_passes, eligible_channels, Channel, ChannelRouter, DeliveryOutcome,
};
use crate::dedup::DedupStore;
use crate::directory::ContactDirectory;
use crate::event::{EventType, NotificationEvent, Severity, RISK_LADDER};
use crate::metrics::{BroadcastMetrics, ChannelMetrics, FanoutMetrics};
use crate::preferences::PreferenceResolver;
use crate::ratelimit::RateLimiter;

/// Result of one channel attempt within an emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelResult {
    /// Routed; the outcome says what the channel did
    Delivered(DeliveryOutcome),
    /// Denied by the rate limiter for this window
    RateLimited,
    /// Routing raised an error; logged and isolated
    Failed,
}

/// Per-channel report for a routed emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: Channel,
    pub result: ChannelResult,
}

/// Outcome of a single `emit`. Never an error: delivery is best-effort
/// from the originating system's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The event survived filtering and dedup; per-channel results attached
    Routed { channels: Vec<ChannelReport> },
    /// Suppressed by the deduplication store
    DuplicateSuppressed,
    /// Recipient has the event's category disabled
    CategoryDisabled,
    /// No channel was both requested and enabled
    NoEligibleChannels,
}

impl EmitOutcome {
    /// Whether at least one channel completed routing.
    pub fn is_delivered(&self) -> bool {
        match self {
            EmitOutcome::Routed { channels } => channels
                .iter()
                .any(|report| matches!(report.result, ChannelResult::Delivered(_))),
            _ => false,
        }
    }
}

/// Outcome of a broadcast operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Completed(BroadcastSummary),
    /// Recipient enumeration failed; nothing was emitted and the engine
    /// will not retry (retry policy belongs to the caller)
    Aborted,
}

/// Tally of a completed broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastSummary {
    pub recipients: usize,
    pub batches: usize,
    pub delivered: usize,
    pub suppressed: usize,
    pub filtered: usize,
}

/// Template expanded into one event per broadcast recipient.
#[derive(Debug, Clone)]
pub struct BroadcastTemplate {
    pub event_type: EventType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub payload: Value,
}

impl BroadcastTemplate {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            title: String::new(),
            message: String::new(),
            payload: Value::Null,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    fn expand(&self, recipient_id: &str) -> NotificationEvent {
        NotificationEvent::builder(self.event_type, recipient_id)
            .severity(self.severity)
            .title(self.title.clone())
            .message(self.message.clone())
            .payload(self.payload.clone())
            .build()
    }
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct FanoutStats {
    pub emitted: AtomicU64,
    pub delivered: AtomicU64,
    pub suppressed: AtomicU64,
    pub filtered: AtomicU64,
    pub channel_failures: AtomicU64,
    pub broadcasts: AtomicU64,
    pub broadcasts_aborted: AtomicU64,
}

impl FanoutStats {
    pub fn snapshot(&self) -> FanoutStatsSnapshot {
        FanoutStatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            broadcasts_aborted: self.broadcasts_aborted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutStatsSnapshot {
    pub emitted: u64,
    pub delivered: u64,
    pub suppressed: u64,
    pub filtered: u64,
    pub channel_failures: u64,
    pub broadcasts: u64,
    pub broadcasts_aborted: u64,
}

/// The fan-out engine.
///
/// Explicitly constructed with its store and queue dependencies injected,
/// so tests run against in-memory fakes and a process can host multiple
/// differently-configured engines.
pub struct NotificationEngine {
    resolver: Arc<PreferenceResolver>,
    dedup: Arc<dyn DedupStore>,
    limiter: Arc<dyn RateLimiter>,
    router: Arc<ChannelRouter>,
    directory: Arc<dyn ContactDirectory>,
    broadcast_batch_size: usize,
    stats: FanoutStats,
}

impl NotificationEngine {
    pub fn new(
        resolver: Arc<PreferenceResolver>,
        dedup: Arc<dyn DedupStore>,
        limiter: Arc<dyn RateLimiter>,
        router: Arc<ChannelRouter>,
        directory: Arc<dyn ContactDirectory>,
        broadcast_batch_size: usize,
    ) -> Self {
        Self {
            resolver,
            dedup,
            limiter,
            router,
            directory,
            broadcast_batch_size: broadcast_batch_size.max(1),
            stats: FanoutStats::default(),
        }
    }

    pub fn stats(&self) -> FanoutStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emit one event.
    #[tracing::instrument(
        name = "engine.emit",
        skip(self, event),
        fields(
            notification_id = %event.id,
            event_type = %event.event_type,
            recipient_id = %event.recipient_id
        )
    )]
    pub async fn emit(&self, event: NotificationEvent) -> EmitOutcome {
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        FanoutMetrics::record_emitted(event.category.as_str());

        let prefs = self.resolver.resolve(&event.recipient_id).await;

        if !category_passes(&prefs, event.category) {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            FanoutMetrics::record_filtered();
            tracing::debug!(category = %event.category, "Category disabled by preferences");
            return EmitOutcome::CategoryDisabled;
        }

        let channels = eligible_channels(&prefs, event.requested_channels.as_ref());
        if channels.is_empty() {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            FanoutMetrics::record_filtered();
            tracing::debug!("No eligible channels, dropping event");
            return EmitOutcome::NoEligibleChannels;
        }

        let dedup_key = event.effective_dedup_key();

        // A worsening position must never be suppressed by an earlier,
        // milder notification, so escalation clearing runs before the
        // admission check
        if let Some(rank) = event.event_type.risk_rank() {
            self.clear_escalated_records(&event, &dedup_key, rank).await;
        }

        let admitted = match self
            .dedup
            .admit(&event.recipient_id, &dedup_key, event.event_type)
            .await
        {
            Ok(admitted) => admitted,
            Err(e) => {
                // Fail open: over-delivery beats over-suppression when the
                // dedup store is unreachable
                tracing::warn!(error = %e, "Dedup store unavailable, admitting event");
                true
            }
        };

        if !admitted {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            FanoutMetrics::record_suppressed();
            tracing::debug!(dedup_key = %dedup_key, "Duplicate suppressed");
            return EmitOutcome::DuplicateSuppressed;
        }

        let in_app_active = channels.contains(&Channel::InApp);
        let mut reports = Vec::with_capacity(channels.len());

        for channel in channels {
            let result = self.attempt_channel(&event, channel, in_app_active).await;
            reports.push(ChannelReport { channel, result });
        }

        let outcome = EmitOutcome::Routed { channels: reports };
        if outcome.is_delivered() {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Emit many events independently and concurrently. One event's
    /// failure or suppression never affects another's delivery.
    pub async fn emit_batch(&self, events: Vec<NotificationEvent>) -> Vec<EmitOutcome> {
        join_all(events.into_iter().map(|event| self.emit(event))).await
    }

    /// Expand a template to every active recipient, in fixed-size batches.
    ///
    /// Batches run sequentially; recipients within a batch run
    /// concurrently, bounding peak concurrency. Enumeration failure aborts
    /// the broadcast outright; nothing is retried here.
    #[tracing::instrument(
        name = "engine.emit_broadcast",
        skip(self, template),
        fields(event_type = %template.event_type)
    )]
    pub async fn emit_broadcast(&self, template: BroadcastTemplate) -> BroadcastOutcome {
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        BroadcastMetrics::record_started();

        let recipients = match self.directory.all_active_recipients().await {
            Ok(recipients) => recipients,
            Err(e) => {
                self.stats.broadcasts_aborted.fetch_add(1, Ordering::Relaxed);
                BroadcastMetrics::record_aborted();
                tracing::error!(error = %e, "Failed to enumerate recipients, abandoning broadcast");
                return BroadcastOutcome::Aborted;
            }
        };

        let mut summary = BroadcastSummary {
            recipients: recipients.len(),
            ..Default::default()
        };

        for batch in recipients.chunks(self.broadcast_batch_size) {
            summary.batches += 1;
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|recipient| self.emit(template.expand(recipient))),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    ref routed @ EmitOutcome::Routed { .. } => {
                        if routed.is_delivered() {
                            summary.delivered += 1;
                        }
                    }
                    EmitOutcome::DuplicateSuppressed => summary.suppressed += 1,
                    EmitOutcome::CategoryDisabled | EmitOutcome::NoEligibleChannels => {
                        summary.filtered += 1
                    }
                }
            }
        }

        tracing::info!(
            recipients = summary.recipients,
            batches = summary.batches,
            delivered = summary.delivered,
            suppressed = summary.suppressed,
            filtered = summary.filtered,
            "Broadcast completed"
        );

        BroadcastOutcome::Completed(summary)
    }

    /// One rate-limit check plus routing attempt, fully isolated.
    async fn attempt_channel(
        &self,
        event: &NotificationEvent,
        channel: Channel,
        in_app_active: bool,
    ) -> ChannelResult {
        // The in-app feed is exempt from rate limiting so a store outage or
        // exhausted budget can never starve the primary surface
        if channel != Channel::InApp {
            let decision = self
                .limiter
                .allow(channel, &event.recipient_id, event.severity)
                .await;

            if !decision.is_allowed() {
                ChannelMetrics::record_rate_limited(channel.as_str());
                tracing::debug!(
                    channel = %channel,
                    severity = %event.severity,
                    "Channel attempt denied by rate limiter"
                );
                return ChannelResult::RateLimited;
            }
        }

        match self.router.route(event, channel, in_app_active).await {
            Ok(outcome) => {
                ChannelMetrics::record_delivered(channel.as_str());
                ChannelResult::Delivered(outcome)
            }
            Err(e) => {
                self.stats.channel_failures.fetch_add(1, Ordering::Relaxed);
                ChannelMetrics::record_failed(channel.as_str());
                tracing::warn!(
                    event_type = %event.event_type,
                    recipient_id = %event.recipient_id,
                    channel = %channel,
                    error = %e,
                    "Channel routing failed, continuing with remaining channels"
                );
                ChannelResult::Failed
            }
        }
    }

    /// Invalidate dedup records left by lower-ranked events for the same
    /// tracked entity: the event's own (possibly entity-scoped) key plus
    /// the default keys of every lower ladder type.
    async fn clear_escalated_records(&self, event: &NotificationEvent, dedup_key: &str, rank: u8) {
        let mut keys: Vec<String> = vec![dedup_key.to_string()];
        for lower in RISK_LADDER.iter().filter(|t| {
            t.risk_rank()
                .map(|lower_rank| lower_rank < rank)
                .unwrap_or(false)
        }) {
            keys.push(format!("{}:{}", event.recipient_id, lower));
        }

        for key in keys {
            match self
                .dedup
                .clear_if_lower(&event.recipient_id, &key, event.event_type)
                .await
            {
                Ok(true) => FanoutMetrics::record_escalation_clear(),
                Ok(false) => {}
                Err(e) => {
                    // Non-fatal: the admission check still runs; at worst a
                    // stale lower-severity record suppresses until it expires
                    tracing::warn!(
                        dedup_key = %key,
                        error = %e,
                        "Escalation clear failed"
                    );
                }
            }
        }
    }
}
