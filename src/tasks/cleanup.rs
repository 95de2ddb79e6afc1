use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::dedup::DedupStore;
use crate::preferences::PreferenceResolver;
use crate::ratelimit::RateLimiter;

/// Background task sweeping expired state out of the in-memory backends.
///
/// Dedup records and rate-limit windows expire logically the moment their
/// window passes; this task only reclaims the memory they occupy. Redis
/// backends expire keys natively, so their sweeps are no-ops.
pub struct CleanupTask {
    dedup: Arc<dyn DedupStore>,
    limiter: Arc<dyn RateLimiter>,
    resolver: Arc<PreferenceResolver>,
    dedup_interval: Duration,
    ratelimit_interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl CleanupTask {
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        limiter: Arc<dyn RateLimiter>,
        resolver: Arc<PreferenceResolver>,
        dedup_interval_seconds: u64,
        ratelimit_interval_seconds: u64,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            dedup,
            limiter,
            resolver,
            dedup_interval: Duration::from_secs(dedup_interval_seconds.max(1)),
            ratelimit_interval: Duration::from_secs(ratelimit_interval_seconds.max(1)),
            shutdown,
        }
    }

    /// Run the sweep loops until a shutdown signal arrives.
    pub async fn run(mut self) {
        let mut dedup_timer = tokio::time::interval(self.dedup_interval);
        let mut ratelimit_timer = tokio::time::interval(self.ratelimit_interval);

        // Skip immediate first tick
        dedup_timer.tick().await;
        ratelimit_timer.tick().await;

        tracing::info!(
            dedup_interval_secs = self.dedup_interval.as_secs(),
            ratelimit_interval_secs = self.ratelimit_interval.as_secs(),
            "Cleanup task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Cleanup task received shutdown signal");
                    break;
                }
                _ = dedup_timer.tick() => {
                    let records_removed = self.dedup.cleanup().await;
                    let prefs_evicted = self.resolver.evict_expired();
                    if records_removed + prefs_evicted > 0 {
                        tracing::debug!(
                            records_removed = records_removed,
                            prefs_evicted = prefs_evicted,
                            "Dedup and preference sweep completed"
                        );
                    }
                }
                _ = ratelimit_timer.tick() => {
                    let windows_removed = self.limiter.cleanup().await;
                    if windows_removed > 0 {
                        tracing::debug!(
                            windows_removed = windows_removed,
                            "Rate limit window sweep completed"
                        );
                    }
                }
            }
        }

        tracing::info!("Cleanup task stopped");
    }
}
