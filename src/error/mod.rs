//! Crate-level error type.
//!
//! Delivery-side failures never reach callers of the engine; this type
//! covers construction and configuration paths where an error is the
//! correct signal (bad settings, unreachable Redis at startup).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] crate::redis::PoolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = NotifyError> = std::result::Result<T, E>;
