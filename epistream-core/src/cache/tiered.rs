//! Two-tier cache (L1: moka in-memory, L2: shared store)
//!
//! Reads check L1 first and fall back to L2, populating L1 on an L2 hit.
//! Writes go to both tiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{CacheStore, MemoryCacheStore};
use crate::error::CacheError;

/// Upper bound on how long an L2 value may be served from L1, since the
/// remaining L2 TTL is not known at read time.
pub const DEFAULT_L1_TTL: Duration = Duration::from_secs(60);

pub struct TieredCacheStore {
    l1: MemoryCacheStore,
    l2: Arc<dyn CacheStore>,
    l1_ttl: Duration,
}

impl TieredCacheStore {
    pub fn new(l1: MemoryCacheStore, l2: Arc<dyn CacheStore>) -> Self {
        Self {
            l1,
            l2,
            l1_ttl: DEFAULT_L1_TTL,
        }
    }
}

#[async_trait]
impl CacheStore for TieredCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(value) = self.l1.get(key).await? {
            tracing::debug!(key, "Cache hit (L1)");
            return Ok(Some(value));
        }

        let Some(value) = self.l2.get(key).await? else {
            return Ok(None);
        };
        tracing::debug!(key, "Cache hit (L2)");

        if !self.l1_ttl.is_zero() {
            self.l1.set(key, &value, self.l1_ttl).await?;
        }
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        if !self.l1_ttl.is_zero() {
            self.l1.set(key, value, ttl.min(self.l1_ttl)).await?;
        }
        self.l2.set(key, value, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_l2_hit_populates_l1() {
        let l2 = Arc::new(MemoryCacheStore::new(10));
        l2.set("episode:x", "v", Duration::from_secs(60)).await.unwrap();

        let l1 = MemoryCacheStore::new(10);
        let tiered = TieredCacheStore::new(l1.clone(), l2);

        assert_eq!(tiered.get("episode:x").await.unwrap().as_deref(), Some("v"));
        assert_eq!(l1.get("episode:x").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_set_writes_both_tiers() {
        let l2 = Arc::new(MemoryCacheStore::new(10));
        let l1 = MemoryCacheStore::new(10);
        let tiered = TieredCacheStore::new(l1.clone(), l2.clone());

        tiered.set("voices:a:1", "[]", Duration::from_secs(30)).await.unwrap();

        assert!(l1.get("voices:a:1").await.unwrap().is_some());
        assert!(l2.get("voices:a:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_miss_in_both() {
        let tiered = TieredCacheStore::new(
            MemoryCacheStore::new(10),
            Arc::new(MemoryCacheStore::new(10)),
        );
        assert_eq!(tiered.get("nope").await.unwrap(), None);
    }
}
