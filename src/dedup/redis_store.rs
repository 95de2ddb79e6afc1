//! Redis-backed dedup store for multi-instance deployments.
//!
//! Admission is `SET key rank NX PX window`, a single atomic check-and-set
//! on the shared store. The escalation clear compares the stored ladder
//! rank inside a Lua script so the read and delete cannot interleave with
//! a concurrent admit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::event::EventType;
use crate::redis::RedisPool;

use super::{DedupError, DedupStats, DedupStore, SuppressionWindows};

/// Rank stored for types outside the risk ladder.
const NO_RANK: i32 = -1;

const CLEAR_IF_LOWER_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if not v then return 0 end
local stored = tonumber(v)
local new = tonumber(ARGV[1])
if stored >= 0 and new > stored then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
"#;

/// Dedup store on a shared Redis.
pub struct RedisDedupStore {
    pool: Arc<RedisPool>,
    prefix: String,
    windows: SuppressionWindows,
    op_timeout: Duration,
    admitted: AtomicU64,
    suppressed: AtomicU64,
    cleared: AtomicU64,
}

impl RedisDedupStore {
    pub fn new(
        windows: SuppressionWindows,
        pool: Arc<RedisPool>,
        prefix: String,
        op_timeout_ms: u64,
    ) -> Self {
        Self {
            pool,
            prefix,
            windows,
            op_timeout: Duration::from_millis(op_timeout_ms),
            admitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            cleared: AtomicU64::new(0),
        }
    }

    fn record_key(&self, recipient_id: &str, dedup_key: &str) -> String {
        format!("{}:{}:{}", self.prefix, recipient_id, dedup_key)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, DedupError>>,
    ) -> Result<T, DedupError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                self.pool.reset_connection().await;
                Err(DedupError::Timeout(self.op_timeout.as_millis() as u64))
            }
        }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn admit(
        &self,
        recipient_id: &str,
        dedup_key: &str,
        event_type: EventType,
    ) -> Result<bool, DedupError> {
        let key = self.record_key(recipient_id, dedup_key);
        let window_ms = self.windows.window_for(event_type).as_millis() as u64;
        let rank = event_type.risk_rank().map(i32::from).unwrap_or(NO_RANK);

        let admitted = self
            .with_timeout(async {
                let mut conn = self.pool.get_connection().await?;
                // SET NX PX returns OK when the key was absent, nil otherwise
                let reply: Option<String> = redis::cmd("SET")
                    .arg(&key)
                    .arg(rank)
                    .arg("NX")
                    .arg("PX")
                    .arg(window_ms)
                    .query_async(&mut conn)
                    .await?;
                Ok(reply.is_some())
            })
            .await?;

        if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }

        Ok(admitted)
    }

    async fn clear_if_lower(
        &self,
        recipient_id: &str,
        dedup_key: &str,
        new_type: EventType,
    ) -> Result<bool, DedupError> {
        let Some(new_rank) = new_type.risk_rank() else {
            return Ok(false);
        };

        let key = self.record_key(recipient_id, dedup_key);
        let script = redis::Script::new(CLEAR_IF_LOWER_SCRIPT);

        let removed = self
            .with_timeout(async {
                let mut conn = self.pool.get_connection().await?;
                let removed: i32 = script
                    .key(&key)
                    .arg(i32::from(new_rank))
                    .invoke_async(&mut conn)
                    .await?;
                Ok(removed == 1)
            })
            .await?;

        if removed {
            self.cleared.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                recipient_id = %recipient_id,
                dedup_key = %dedup_key,
                new_type = %new_type,
                "Escalation cleared dedup record"
            );
        }

        Ok(removed)
    }

    async fn stats(&self) -> DedupStats {
        DedupStats {
            backend_type: "redis".to_string(),
            tracked_records: 0,
            admitted: self.admitted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }
}
