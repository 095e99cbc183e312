//! Redis-backed cache store shared across nodes

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use super::CacheStore;
use crate::error::CacheError;
use crate::resilience::timeout::REDIS_OPERATION_TIMEOUT;

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCacheStore {
    /// Connect and wrap the connection in a reconnecting manager.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)??;

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let value: Option<String> = tokio::time::timeout(REDIS_OPERATION_TIMEOUT, conn.get(&key))
            .await
            .map_err(|_| CacheError::Timeout)??;

        tracing::debug!(key = %key, hit = value.is_some(), "Redis cache lookup");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        // EX takes whole seconds; never round a sub-second TTL down to zero
        let seconds = ttl.as_secs().max(1);

        let mut conn = self.conn.clone();
        let key = self.key(key);
        let _: () = tokio::time::timeout(REDIS_OPERATION_TIMEOUT, conn.set_ex(&key, value, seconds))
            .await
            .map_err(|_| CacheError::Timeout)??;

        tracing::debug!(key = %key, ttl_seconds = seconds, "Cached in Redis");
        Ok(())
    }
}
