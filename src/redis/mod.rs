//! Redis connection pool for shared dedup and rate-limit state.
//!
//! A multi-instance deployment points the dedup store and rate limiter at a
//! shared Redis so admission decisions hold across orchestrator instances.
//! The pool manages one multiplexed connection, re-established on demand.

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Connection could not be established in time
    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

/// Redis connection pool for command traffic.
///
/// Multiplexed connections are cheap to clone and safe to share across
/// tasks, so one cached connection serves all callers.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
}

impl RedisPool {
    pub fn new(config: RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            config,
        })
    }

    /// Get a connection, establishing one if none is cached.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }
        self.connect().await
    }

    /// Drop the cached connection so the next caller reconnects.
    /// Called by backends after an operation fails.
    pub async fn reset_connection(&self) {
        let mut conn = self.connection.write().await;
        if conn.take().is_some() {
            tracing::warn!(url = %self.config.url, "Dropped failed Redis connection");
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *guard {
            return Ok(c.clone());
        }

        let timeout = std::time::Duration::from_millis(self.config.connect_timeout_ms);
        let conn = tokio::time::timeout(timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                PoolError::ConnectionUnavailable(format!(
                    "connect timed out after {}ms",
                    self.config.connect_timeout_ms
                ))
            })??;

        tracing::info!(url = %self.config.url, "Established Redis connection");
        *guard = Some(conn.clone());
        Ok(conn)
    }
}
