//! Prometheus metrics for the fan-out engine.
//!
//! Callers of `emit` never see delivery failures, so these counters (plus
//! structured logs) are the operational signal for suppression, rate
//! limiting, and per-channel routing outcomes.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "meridian_notify";

lazy_static! {
    // ============================================================================
    // Fan-out metrics
    // ============================================================================

    /// Events accepted by emit, by category
    pub static ref EVENTS_EMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_emitted_total", METRIC_PREFIX),
        "Events submitted to the fan-out engine",
        &["category"]
    ).unwrap();

    /// Events dropped by category or channel filtering
    pub static ref EVENTS_FILTERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_filtered_total", METRIC_PREFIX),
        "Events dropped by preference filtering before any delivery"
    ).unwrap();

    /// Events suppressed as duplicates
    pub static ref EVENTS_SUPPRESSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_suppressed_total", METRIC_PREFIX),
        "Events suppressed by the deduplication store"
    ).unwrap();

    /// Dedup records cleared by severity escalation
    pub static ref ESCALATION_CLEARS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_escalation_clears_total", METRIC_PREFIX),
        "Dedup records invalidated by a severity escalation"
    ).unwrap();

    // ============================================================================
    // Channel metrics
    // ============================================================================

    /// Successful channel routings, by channel
    pub static ref CHANNEL_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_delivered_total", METRIC_PREFIX),
        "Channel routings that completed",
        &["channel"]
    ).unwrap();

    /// Failed channel routings, by channel
    pub static ref CHANNEL_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_failed_total", METRIC_PREFIX),
        "Channel routings that raised an isolated failure",
        &["channel"]
    ).unwrap();

    /// Channel attempts denied by the rate limiter, by channel
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_rate_limited_total", METRIC_PREFIX),
        "Channel attempts denied by the rate limiter",
        &["channel"]
    ).unwrap();

    // ============================================================================
    // Queue metrics
    // ============================================================================

    /// Jobs handed to delivery queues, by channel
    pub static ref JOBS_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_enqueued_total", METRIC_PREFIX),
        "Delivery jobs enqueued for external workers",
        &["channel"]
    ).unwrap();

    /// Jobs rejected by a full or failing queue, by channel
    pub static ref JOBS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_rejected_total", METRIC_PREFIX),
        "Delivery jobs rejected at enqueue",
        &["channel"]
    ).unwrap();

    // ============================================================================
    // Preference metrics
    // ============================================================================

    /// Preference cache hits
    pub static ref PREFS_CACHE_HITS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_prefs_cache_hits_total", METRIC_PREFIX),
        "Preference resolutions served from cache"
    ).unwrap();

    /// Preference store hits
    pub static ref PREFS_STORE_HITS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_prefs_store_hits_total", METRIC_PREFIX),
        "Preference resolutions served from the store"
    ).unwrap();

    /// Preference resolutions that fell back to defaults
    pub static ref PREFS_DEFAULTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_prefs_defaults_total", METRIC_PREFIX),
        "Preference resolutions that served static defaults"
    ).unwrap();

    // ============================================================================
    // Broadcast metrics
    // ============================================================================

    /// Broadcasts started
    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Broadcast operations started"
    ).unwrap();

    /// Broadcasts abandoned because recipients could not be enumerated
    pub static ref BROADCASTS_ABORTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_aborted_total", METRIC_PREFIX),
        "Broadcast operations abandoned at enumeration"
    ).unwrap();
}

/// Encode all registered metrics in Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Fan-out level metric helpers.
pub struct FanoutMetrics;

impl FanoutMetrics {
    pub fn record_emitted(category: &str) {
        EVENTS_EMITTED_TOTAL.with_label_values(&[category]).inc();
    }

    pub fn record_filtered() {
        EVENTS_FILTERED_TOTAL.inc();
    }

    pub fn record_suppressed() {
        EVENTS_SUPPRESSED_TOTAL.inc();
    }

    pub fn record_escalation_clear() {
        ESCALATION_CLEARS_TOTAL.inc();
    }
}

/// Per-channel routing metric helpers.
pub struct ChannelMetrics;

impl ChannelMetrics {
    pub fn record_delivered(channel: &str) {
        CHANNEL_DELIVERED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_failed(channel: &str) {
        CHANNEL_FAILED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_rate_limited(channel: &str) {
        RATE_LIMITED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_enqueued(channel: &str) {
        JOBS_ENQUEUED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_rejected(channel: &str) {
        JOBS_REJECTED_TOTAL.with_label_values(&[channel]).inc();
    }
}

/// Preference resolver metric helpers.
pub struct PreferenceMetrics;

impl PreferenceMetrics {
    pub fn record_cache_hit() {
        PREFS_CACHE_HITS_TOTAL.inc();
    }

    pub fn record_store_hit() {
        PREFS_STORE_HITS_TOTAL.inc();
    }

    pub fn record_defaults_served() {
        PREFS_DEFAULTS_TOTAL.inc();
    }
}

/// Broadcast metric helpers.
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_started() {
        BROADCASTS_TOTAL.inc();
    }

    pub fn record_aborted() {
        BROADCASTS_ABORTED_TOTAL.inc();
    }
}
