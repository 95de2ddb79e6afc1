mod settings;

pub use settings::{
    BroadcastConfig, DedupConfig, PreferenceCacheConfig, QueueSettings, RateLimitSettings,
    RedisConfig, Settings,
};
