//! Source Resolver and Capability Aggregator

pub mod aggregator;
pub mod resolver;

pub use aggregator::CapabilityAggregator;
pub use resolver::SourceResolver;

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{get_json, set_json, CacheStore, KeyBuilder};
use crate::metrics::MetricsSink;

/// Cache read where any failure counts as a miss.
async fn cache_lookup<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    metrics: &dyn MetricsSink,
    key: &str,
) -> Option<T> {
    let value = match get_json::<T>(cache, key).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
            None
        }
    };

    let hit = value.is_some();
    metrics.record_cache_lookup(KeyBuilder::namespace(key), hit);
    tracing::debug!(key, hit, "Cache lookup");
    value
}

/// Cache write whose failure is logged and otherwise ignored.
async fn cache_store<T: Serialize + Sync>(cache: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    if let Err(e) = set_json(cache, key, value, ttl).await {
        tracing::warn!(key, error = %e, "Failed to write resolved value to cache");
    }
}
