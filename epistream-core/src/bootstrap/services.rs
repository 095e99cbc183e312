//! Service initialization and dependency injection

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{CacheStore, MemoryCacheStore, RedisCacheStore, TieredCacheStore};
use crate::metrics::MetricsSink;
use crate::models::Capability;
use crate::provider::{Normalizer, UpstreamClient};
use crate::service::aggregator::AggregatorDeps;
use crate::service::resolver::ResolverDeps;
use crate::service::{CapabilityAggregator, SourceResolver};
use crate::{Config, ProxyUrlBuilder};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    pub resolver: SourceResolver,
    pub aggregator: CapabilityAggregator,
    pub cache: Arc<dyn CacheStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub proxy_urls: ProxyUrlBuilder,
}

/// Pick the cache layout: memory only, or memory in front of Redis.
///
/// A Redis that cannot be reached at startup degrades to memory only.
pub async fn init_cache(config: &Config) -> Arc<dyn CacheStore> {
    let l1 = MemoryCacheStore::new(config.cache.l1_max_capacity);

    if config.redis.url.is_empty() {
        info!("Redis not configured, using in-memory cache");
        return Arc::new(l1);
    }

    match RedisCacheStore::connect(
        &config.redis.url,
        config.redis.key_prefix.clone(),
        Duration::from_secs(config.redis.connect_timeout_seconds),
    )
    .await
    {
        Ok(redis) => {
            info!("Redis cache connected");
            Arc::new(TieredCacheStore::new(l1, Arc::new(redis)))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, falling back to in-memory cache");
            Arc::new(l1)
        }
    }
}

/// Build the resolver and aggregator around a given cache.
pub fn build_services(
    config: &Config,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<dyn MetricsSink>,
) -> anyhow::Result<Services> {
    let client = UpstreamClient::from_config(&config.upstream)?;
    let proxy_urls = ProxyUrlBuilder::from_config(&config.proxy);
    let normalizer = Normalizer::new(proxy_urls.clone());
    let retry = config.retry_policy();

    let resolver = SourceResolver::new(ResolverDeps {
        client: client.clone(),
        endpoints: config.providers.endpoints_for(Capability::Sources),
        retry,
        normalizer: normalizer.clone(),
        cache: Arc::clone(&cache),
        metrics: Arc::clone(&metrics),
        ttl: Duration::from_secs(config.cache.episode_ttl_seconds),
        single_flight: config.cache.single_flight,
    });

    let aggregator = CapabilityAggregator::new(AggregatorDeps {
        client,
        providers: config.providers.clone(),
        retry,
        normalizer,
        cache: Arc::clone(&cache),
        metrics: Arc::clone(&metrics),
        ttl: Duration::from_secs(config.cache.capability_ttl_seconds),
        single_flight: config.cache.single_flight,
    });

    for capability in std::iter::once(Capability::Sources).chain(Capability::AGGREGATED) {
        let count = config.providers.endpoints_for(capability).len();
        if count == 0 {
            warn!(capability = %capability, "No provider endpoints configured");
        } else {
            info!(capability = %capability, endpoints = count, "Provider chain ready");
        }
    }

    Ok(Services {
        resolver,
        aggregator,
        cache,
        metrics,
        proxy_urls,
    })
}

/// Initialize all core services
pub async fn init_services(config: &Config, metrics: Arc<dyn MetricsSink>) -> anyhow::Result<Services> {
    info!("Initializing services...");
    let cache = init_cache(config).await;
    build_services(config, cache, metrics)
}
