//! In-memory dedup store backed by DashMap.
//!
//! Suitable for single-instance deployments and tests. Admission uses the
//! DashMap entry API, which holds the shard lock for the whole
//! check-and-set, so concurrent admits for one key serialize.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use async_trait::async_trait;

use crate::event::EventType;

use super::{DedupError, DedupStats, DedupStore, SuppressionWindows};

#[derive(Debug, Clone)]
struct DedupRecord {
    last_type: EventType,
    expires_at: DateTime<Utc>,
}

impl DedupRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory dedup store.
pub struct MemoryDedupStore {
    records: DashMap<String, DedupRecord>,
    windows: SuppressionWindows,
    admitted: AtomicU64,
    suppressed: AtomicU64,
    cleared: AtomicU64,
}

impl MemoryDedupStore {
    pub fn new(windows: SuppressionWindows) -> Self {
        Self {
            records: DashMap::new(),
            windows,
            admitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            cleared: AtomicU64::new(0),
        }
    }

    fn record_key(recipient_id: &str, dedup_key: &str) -> String {
        format!("{}:{}", recipient_id, dedup_key)
    }

    /// Remove expired records to bound memory. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        let removed = before - self.records.len();

        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = self.records.len(),
                "Cleaned up expired dedup records"
            );
        }

        removed
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn admit(
        &self,
        recipient_id: &str,
        dedup_key: &str,
        event_type: EventType,
    ) -> Result<bool, DedupError> {
        let key = Self::record_key(recipient_id, dedup_key);
        let now = Utc::now();
        let window = self.windows.window_for(event_type);
        let expires_at = now
            + ChronoDuration::from_std(window)
                .unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 2_000));

        // The entry guard holds the shard lock across check and set
        let admitted = match self.records.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(DedupRecord {
                        last_type: event_type,
                        expires_at,
                    });
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(DedupRecord {
                    last_type: event_type,
                    expires_at,
                });
                true
            }
        };

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

        let key = Self::record_key(recipient_id, dedup_key);
        let removed = self
            .records
            .remove_if(&key, |_, record| {
                matches!(record.last_type.risk_rank(), Some(stored) if stored < new_rank)
            })
            .is_some();

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
            backend_type: "memory".to_string(),
            tracked_records: self.records.len(),
            admitted: self.admitted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }

    async fn cleanup(&self) -> usize {
        self.cleanup_expired()
    }
}
