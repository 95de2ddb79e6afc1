//! Preference resolution with a short-lived cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::metrics::PreferenceMetrics;

use super::{PreferenceStore, RecipientPreferences};

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Cache entry time-to-live in seconds
    pub cache_ttl_seconds: u64,
    /// Upper bound on a single store lookup in milliseconds
    pub lookup_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            lookup_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedPreferences {
    prefs: RecipientPreferences,
    cached_at: DateTime<Utc>,
}

impl CachedPreferences {
    fn is_fresh(&self, ttl_seconds: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age.num_seconds() < ttl_seconds as i64
    }
}

/// Counters for resolver behavior.
#[derive(Debug, Default)]
struct ResolverCounters {
    cache_hits: AtomicU64,
    store_hits: AtomicU64,
    defaults_served: AtomicU64,
}

/// Snapshot of resolver statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ResolverStats {
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub store_hits: u64,
    pub defaults_served: u64,
}

/// Resolves per-recipient preferences with a TTL cache and static defaults.
///
/// `resolve` never fails. Cache writes are idempotent upserts, so concurrent
/// resolution for the same recipient needs no mutual exclusion; the worst
/// case is a redundant store lookup.
pub struct PreferenceResolver {
    store: Arc<dyn PreferenceStore>,
    cache: DashMap<String, CachedPreferences>,
    config: ResolverConfig,
    counters: ResolverCounters,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn PreferenceStore>, config: ResolverConfig) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            config,
            counters: ResolverCounters::default(),
        }
    }

    /// Resolve preferences for a recipient.
    ///
    /// Order: fresh cache entry, then store lookup with a bounded timeout,
    /// then static defaults. Absent records and store failures both degrade
    /// to the defaults; only failures are logged.
    pub async fn resolve(&self, recipient_id: &str) -> RecipientPreferences {
        if let Some(entry) = self.cache.get(recipient_id) {
            if entry.is_fresh(self.config.cache_ttl_seconds) {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                PreferenceMetrics::record_cache_hit();
                return entry.prefs.clone();
            }
        }

        let timeout = Duration::from_millis(self.config.lookup_timeout_ms);
        let lookup = tokio::time::timeout(timeout, self.store.get(recipient_id)).await;

        match lookup {
            Ok(Ok(Some(prefs))) => {
                self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
                PreferenceMetrics::record_store_hit();
                self.cache.insert(
                    recipient_id.to_string(),
                    CachedPreferences {
                        prefs: prefs.clone(),
                        cached_at: Utc::now(),
                    },
                );
                prefs
            }
            Ok(Ok(None)) => self.serve_defaults(recipient_id),
            Ok(Err(e)) => {
                tracing::warn!(
                    recipient_id = %recipient_id,
                    error = %e,
                    "Preference lookup failed, serving defaults"
                );
                self.serve_defaults(recipient_id)
            }
            Err(_) => {
                tracing::warn!(
                    recipient_id = %recipient_id,
                    timeout_ms = self.config.lookup_timeout_ms,
                    "Preference lookup timed out, serving defaults"
                );
                self.serve_defaults(recipient_id)
            }
        }
    }

    fn serve_defaults(&self, _recipient_id: &str) -> RecipientPreferences {
        self.counters.defaults_served.fetch_add(1, Ordering::Relaxed);
        PreferenceMetrics::record_defaults_served();
        RecipientPreferences::default()
    }

    /// Drop expired cache entries. Returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.cache_ttl_seconds;
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.is_fresh(ttl));
        before - self.cache.len()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            cache_entries: self.cache.len(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            defaults_served: self.counters.defaults_served.load(Ordering::Relaxed),
        }
    }
}
