//! Per (channel, recipient, severity) rate limiting.
//!
//! Bounds delivery volume per channel so a flapping upstream condition
//! cannot spam a recipient. Checked after deduplication; channels are
//! evaluated independently, so one channel exhausting its budget never
//! blocks the others.
//!
//! Policy: the limiter fails open. A backend outage logs at warn and allows
//! delivery; the in-app channel is additionally exempted from rate limiting
//! entirely at the orchestrator, so it can never be starved by a store
//! outage.

mod local;
mod redis_backend;
mod window;

pub use local::LocalRateLimiter;
pub use redis_backend::RedisRateLimiter;
pub use window::WindowCounter;

use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::config::RateLimitSettings;
use crate::event::Severity;
use crate::redis::RedisPool;

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub enum RateLimitDecision {
    /// Admission granted
    Allowed { remaining: u32, limit: u32 },
    /// Admission denied for this window
    Denied { retry_after_seconds: u64, limit: u32 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Runtime rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_seconds: u64,
    pub critical_per_window: u32,
    pub warning_per_window: u32,
    pub info_per_window: u32,
}

impl RateLimitConfig {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            enabled: settings.enabled,
            window_seconds: settings.window_seconds,
            critical_per_window: settings.critical_per_window,
            warning_per_window: settings.warning_per_window,
            info_per_window: settings.info_per_window,
        }
    }

    /// Ceiling for a severity bucket. Applied per (channel, recipient) key,
    /// so each channel spends an independent budget.
    pub fn limit_for(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical_per_window,
            Severity::Warning => self.warning_per_window,
            Severity::Info => self.info_per_window,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

/// Backend trait for rate limiting.
///
/// Implementations must be thread-safe and must never surface backend
/// failures to the caller: on any internal error they log and allow.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Backend type identifier for diagnostics.
    fn backend_type(&self) -> &'static str;

    /// Check admission for one channel attempt.
    async fn allow(
        &self,
        channel: Channel,
        recipient_id: &str,
        severity: Severity,
    ) -> RateLimitDecision;

    /// Drop counters whose window is long past. Backends with native TTL
    /// expiry have nothing to sweep and keep the default no-op.
    async fn cleanup(&self) -> usize {
        0
    }
}

/// Create a rate limiter based on configuration.
///
/// - `"redis"`: Returns a `RedisRateLimiter` if a Redis pool is provided
/// - `"memory"` (default): Returns a `LocalRateLimiter`
pub fn create_rate_limiter(
    settings: &RateLimitSettings,
    redis_pool: Option<Arc<RedisPool>>,
    op_timeout_ms: u64,
) -> Arc<dyn RateLimiter> {
    let config = RateLimitConfig::from_settings(settings);

    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis rate limiter"
                );
                Arc::new(RedisRateLimiter::new(
                    config,
                    pool,
                    settings.redis_prefix.clone(),
                    op_timeout_ms,
                ))
            } else {
                tracing::warn!(
                    "Redis rate limiter requested but no pool provided, falling back to local"
                );
                Arc::new(LocalRateLimiter::new(config))
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating local rate limiter");
            Arc::new(LocalRateLimiter::new(config))
        }
    }
}

pub(crate) fn bucket_key(channel: Channel, recipient_id: &str, severity: Severity) -> String {
    format!("{}:{}:{}", channel, recipient_id, severity)
}
