//! Deduplication store.
//!
//! Tracks whether a (recipient, dedup key) pair has already been delivered
//! within its suppression window. Admission is a single atomic
//! check-and-set; two near-simultaneous emits for the same key must never
//! both be admitted. The only active invalidation is the escalation clear,
//! which removes a record left by a strictly lower-ranked event on the
//! liquidation-risk ladder.

mod memory;
mod redis_store;

pub use memory::MemoryDedupStore;
pub use redis_store::RedisDedupStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::DedupConfig;
use crate::event::EventType;
use crate::redis::RedisPool;

/// Errors from dedup backend operations.
#[derive(Debug, Error)]
pub enum DedupError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection pool failed
    #[error("Redis pool error: {0}")]
    Pool(#[from] crate::redis::PoolError),

    /// Operation exceeded its deadline
    #[error("Dedup operation timed out after {0}ms")]
    Timeout(u64),
}

/// Per-event-type suppression windows.
#[derive(Debug, Clone)]
pub struct SuppressionWindows {
    pub default_window: Duration,
    pub broadcast_window: Duration,
}

impl SuppressionWindows {
    pub fn from_config(config: &DedupConfig) -> Self {
        Self {
            default_window: Duration::from_secs(config.suppression_window_seconds),
            broadcast_window: Duration::from_secs(config.broadcast_window_seconds),
        }
    }

    /// Suppression window for an event type. System broadcasts repeat on a
    /// much longer cadence than incident-scoped events.
    pub fn window_for(&self, event_type: EventType) -> Duration {
        match event_type {
            EventType::SystemBroadcast | EventType::SystemMaintenance => self.broadcast_window,
            _ => self.default_window,
        }
    }
}

impl Default for SuppressionWindows {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

/// Statistics about a dedup store.
#[derive(Debug, Clone, Serialize)]
pub struct DedupStats {
    /// Backend type identifier
    pub backend_type: String,
    /// Records currently tracked (memory backend only; 0 for redis)
    pub tracked_records: usize,
    /// Total admissions
    pub admitted: u64,
    /// Total duplicate suppressions
    pub suppressed: u64,
    /// Total escalation clears that removed a record
    pub cleared: u64,
}

/// Backend trait for the deduplication store.
///
/// Implementations must be thread-safe (`Send + Sync`) and must make
/// `admit` atomic per key: concurrent calls for an identical key within the
/// window yield exactly one `true`.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Record an admission for the key if none exists within its window.
    ///
    /// Returns `true` when the caller should deliver, `false` when the event
    /// is a duplicate and must be skipped.
    async fn admit(
        &self,
        recipient_id: &str,
        dedup_key: &str,
        event_type: EventType,
    ) -> Result<bool, DedupError>;

    /// Escalation clear: remove the record for the key iff the type it was
    /// admitted with ranks strictly below `new_type` on the risk ladder.
    ///
    /// Idempotent; clearing an absent record is a no-op. Returns whether a
    /// record was removed.
    async fn clear_if_lower(
        &self,
        recipient_id: &str,
        dedup_key: &str,
        new_type: EventType,
    ) -> Result<bool, DedupError>;

    /// Current statistics.
    async fn stats(&self) -> DedupStats;

    /// Remove expired records. Backends with native TTL expiry have nothing
    /// to sweep and keep the default no-op.
    async fn cleanup(&self) -> usize {
        0
    }
}

/// Create a dedup store based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend`
/// setting:
/// - `"redis"`: Returns a `RedisDedupStore` if a Redis pool is provided
/// - `"memory"` (default): Returns a `MemoryDedupStore`
pub fn create_dedup_store(
    config: &DedupConfig,
    redis_pool: Option<Arc<RedisPool>>,
    op_timeout_ms: u64,
) -> Arc<dyn DedupStore> {
    let windows = SuppressionWindows::from_config(config);

    match config.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %config.redis_prefix,
                    "Creating Redis dedup store"
                );
                Arc::new(RedisDedupStore::new(
                    windows,
                    pool,
                    config.redis_prefix.clone(),
                    op_timeout_ms,
                ))
            } else {
                tracing::warn!(
                    "Redis dedup backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryDedupStore::new(windows))
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory dedup store");
            Arc::new(MemoryDedupStore::new(windows))
        }
    }
}
