//! Local in-memory rate limiter.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use crate::channel::Channel;
use crate::event::Severity;

use super::window::WindowCounter;
use super::{bucket_key, RateLimitConfig, RateLimitDecision, RateLimiter};

/// In-process rate limiter keyed by (channel, recipient, severity).
///
/// Suitable for single-instance deployments and tests; a multi-instance
/// deployment should use the Redis backend so the ceiling holds across
/// orchestrator instances.
pub struct LocalRateLimiter {
    counters: DashMap<String, WindowCounter>,
    config: RateLimitConfig,
}

impl LocalRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            counters: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Drop counters whose window is long past. Returns the number removed.
    pub fn cleanup_stale(&self) -> usize {
        let window_ms = self.config.window_seconds * 1000;
        let current_window = (WindowCounter::now_millis() as u64 / window_ms.max(1)) as u32;
        let mut removed = 0;

        self.counters.retain(|_, counter| {
            // Keep the current and immediately previous window
            if counter.last_window() + 1 < current_window {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = self.counters.len(),
                "Cleaned up stale rate limit windows"
            );
        }

        removed
    }

    pub fn stats(&self) -> LocalRateLimiterStats {
        LocalRateLimiterStats {
            enabled: self.config.enabled,
            tracked_windows: self.counters.len(),
            window_seconds: self.config.window_seconds,
        }
    }
}

/// Statistics about the local rate limiter.
#[derive(Debug, Clone, Serialize)]
pub struct LocalRateLimiterStats {
    pub enabled: bool,
    pub tracked_windows: usize,
    pub window_seconds: u64,
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    fn backend_type(&self) -> &'static str {
        "local"
    }

    async fn allow(
        &self,
        channel: Channel,
        recipient_id: &str,
        severity: Severity,
    ) -> RateLimitDecision {
        let limit = self.config.limit_for(severity);

        if !self.config.enabled {
            return RateLimitDecision::Allowed {
                remaining: u32::MAX,
                limit,
            };
        }

        let key = bucket_key(channel, recipient_id, severity);
        let window_ms = self.config.window_seconds * 1000;

        let counter = self.counters.entry(key).or_default();
        let (admitted, used) = counter.try_admit(limit, window_ms);

        if admitted {
            RateLimitDecision::Allowed {
                remaining: limit.saturating_sub(used),
                limit,
            }
        } else {
            RateLimitDecision::Denied {
                retry_after_seconds: self.config.window_seconds,
                limit,
            }
        }
    }

    async fn cleanup(&self) -> usize {
        self.cleanup_stale()
    }
}
