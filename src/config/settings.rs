use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub preferences: PreferenceCacheConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub ratelimit: RateLimitSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-command timeout in milliseconds
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceCacheConfig {
    /// Cache entry TTL in seconds
    #[serde(default = "default_pref_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Store lookup timeout in milliseconds
    #[serde(default = "default_pref_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Backend: "memory" or "redis"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Default suppression window in seconds
    #[serde(default = "default_suppression_window")]
    pub suppression_window_seconds: u64,
    /// Suppression window for system broadcasts in seconds
    #[serde(default = "default_broadcast_window")]
    pub broadcast_window_seconds: u64,
    /// Record TTL sweep interval in seconds (memory backend)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Key prefix (redis backend)
    #[serde(default = "default_dedup_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Backend: "memory" or "redis"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Window length in seconds
    #[serde(default = "default_rl_window")]
    pub window_seconds: u64,
    /// Admissions per window for critical events (per channel, per recipient)
    #[serde(default = "default_rl_critical")]
    pub critical_per_window: u32,
    /// Admissions per window for warning events
    #[serde(default = "default_rl_warning")]
    pub warning_per_window: u32,
    /// Admissions per window for info events
    #[serde(default = "default_rl_info")]
    pub info_per_window: u32,
    /// Stale window sweep interval in seconds (memory backend)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Key prefix (redis backend)
    #[serde(default = "default_rl_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Maximum jobs held per queue before enqueue is rejected
    #[serde(default = "default_queue_capacity")]
    pub max_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Recipients processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_op_timeout_ms() -> u64 {
    500
}

fn default_pref_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_pref_lookup_timeout_ms() -> u64 {
    500
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_suppression_window() -> u64 {
    1_800 // 30 minutes: one "incident"
}

fn default_broadcast_window() -> u64 {
    86_400 // broadcasts repeat at most daily per recipient
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_dedup_prefix() -> String {
    "notify:dedup".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_rl_window() -> u64 {
    3_600
}

fn default_rl_critical() -> u32 {
    30
}

fn default_rl_warning() -> u32 {
    10
}

fn default_rl_info() -> u32 {
    5
}

fn default_rl_prefix() -> String {
    "notify:ratelimit".to_string()
}

fn default_queue_capacity() -> usize {
    100_000
}

fn default_batch_size() -> usize {
    100
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // REDIS_URL, DEDUP_BACKEND, RATELIMIT_WINDOW_SECONDS, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl Default for PreferenceCacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_pref_cache_ttl(),
            lookup_timeout_ms: default_pref_lookup_timeout_ms(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            suppression_window_seconds: default_suppression_window(),
            broadcast_window_seconds: default_broadcast_window(),
            cleanup_interval_seconds: default_cleanup_interval(),
            redis_prefix: default_dedup_prefix(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: default_backend(),
            window_seconds: default_rl_window(),
            critical_per_window: default_rl_critical(),
            warning_per_window: default_rl_warning(),
            info_per_window: default_rl_info(),
            cleanup_interval_seconds: default_cleanup_interval(),
            redis_prefix: default_rl_prefix(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_capacity: default_queue_capacity(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}
