//! Redis-backed rate limiter for multi-instance deployments.
//!
//! Uses an atomic INCR + EXPIRE Lua script per fixed window so the count
//! and its TTL are set in one round trip. Fails open: any backend error is
//! logged at warn and the attempt is allowed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::event::Severity;
use crate::redis::RedisPool;

use super::window::WindowCounter;
use super::{bucket_key, RateLimitConfig, RateLimitDecision, RateLimiter};

const INCR_WINDOW_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

/// Rate limiter on a shared Redis.
pub struct RedisRateLimiter {
    pool: Arc<RedisPool>,
    prefix: String,
    config: RateLimitConfig,
    op_timeout: Duration,
}

impl RedisRateLimiter {
    pub fn new(
        config: RateLimitConfig,
        pool: Arc<RedisPool>,
        prefix: String,
        op_timeout_ms: u64,
    ) -> Self {
        Self {
            pool,
            prefix,
            config,
            op_timeout: Duration::from_millis(op_timeout_ms),
        }
    }

    /// Key for the current fixed window of a bucket.
    fn window_key(&self, channel: Channel, recipient_id: &str, severity: Severity) -> String {
        let window = WindowCounter::now_millis() / (self.config.window_seconds as i64 * 1000);
        format!(
            "{}:{}:{}",
            self.prefix,
            bucket_key(channel, recipient_id, severity),
            window
        )
    }

    async fn try_count(&self, key: &str) -> Result<u32, String> {
        let op = async {
            let mut conn = self
                .pool
                .get_connection()
                .await
                .map_err(|e| e.to_string())?;
            let script = redis::Script::new(INCR_WINDOW_SCRIPT);
            script
                .key(key)
                .arg(self.config.window_seconds)
                .invoke_async::<u32>(&mut conn)
                .await
                .map_err(|e| e.to_string())
        };

        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                self.pool.reset_connection().await;
                Err(format!("timed out after {}ms", self.op_timeout.as_millis()))
            }
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    fn backend_type(&self) -> &'static str {
        "redis"
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

        let key = self.window_key(channel, recipient_id, severity);

        match self.try_count(&key).await {
            Ok(count) => {
                if count <= limit {
                    RateLimitDecision::Allowed {
                        remaining: limit - count,
                        limit,
                    }
                } else {
                    RateLimitDecision::Denied {
                        retry_after_seconds: self.config.window_seconds,
                        limit,
                    }
                }
            }
            Err(e) => {
                // Fail open: delivery volume control is not worth dropping
                // notifications over a store outage
                tracing::warn!(
                    channel = %channel,
                    recipient_id = %recipient_id,
                    error = %e,
                    "Rate limit backend unavailable, allowing delivery"
                );
                RateLimitDecision::Allowed {
                    remaining: 0,
                    limit,
                }
            }
        }
    }
}
