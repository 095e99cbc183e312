//! Source Resolver
//!
//! Resolves one episode's full source list: validate, cache lookup, ordered
//! provider chain with retry, normalization, cache write.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::{cache_lookup, cache_store};
use crate::cache::{CacheStore, KeyBuilder, SingleFlight};
use crate::error::{ResolutionError, UpstreamError};
use crate::metrics::MetricsSink;
use crate::models::{Capability, EpisodeSourceSet, ProviderEndpoint};
use crate::provider::{schema, Normalizer, ProviderChain, UpstreamClient};
use crate::resilience::retry::RetryPolicy;
use crate::validation::validate_episode_id;

/// Episode source resolution service
#[derive(Clone)]
pub struct SourceResolver {
    inner: Arc<Inner>,
}

struct Inner {
    client: UpstreamClient,
    chain: ProviderChain<EpisodeSourceSet>,
    normalizer: Normalizer,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<dyn MetricsSink>,
    ttl: Duration,
    single_flight: Option<SingleFlight<EpisodeSourceSet, ResolutionError>>,
}

impl std::fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResolver")
            .field("endpoints", &self.inner.chain.endpoints().len())
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

/// Construction parameters for [`SourceResolver`].
pub struct ResolverDeps {
    pub client: UpstreamClient,
    pub endpoints: Vec<ProviderEndpoint>,
    pub retry: RetryPolicy,
    pub normalizer: Normalizer,
    pub cache: Arc<dyn CacheStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub ttl: Duration,
    pub single_flight: bool,
}

impl SourceResolver {
    #[must_use]
    pub fn new(deps: ResolverDeps) -> Self {
        let chain = ProviderChain::new(
            Capability::Sources,
            deps.endpoints,
            deps.retry,
            Arc::clone(&deps.metrics),
        );

        Self {
            inner: Arc::new(Inner {
                client: deps.client,
                chain,
                normalizer: deps.normalizer,
                cache: deps.cache,
                metrics: deps.metrics,
                ttl: deps.ttl,
                single_flight: deps.single_flight.then(SingleFlight::new),
            }),
        }
    }

    /// Resolve the full source list for `episode_id`.
    ///
    /// Identical calls within the TTL are served from cache without
    /// contacting any provider.
    pub async fn resolve(&self, episode_id: &str) -> Result<EpisodeSourceSet, ResolutionError> {
        validate_episode_id(episode_id).map_err(|e| ResolutionError::InvalidInput(e.to_string()))?;

        let key = KeyBuilder::episode(episode_id);
        if let Some(cached) =
            cache_lookup::<EpisodeSourceSet>(&*self.inner.cache, &*self.inner.metrics, &key).await
        {
            return Ok(cached);
        }

        match &self.inner.single_flight {
            Some(sf) => {
                sf.run(&key, self.resolve_uncached(episode_id, &key), || {
                    ResolutionError::Internal("concurrent resolution was abandoned".to_string())
                })
                .await
            }
            None => self.resolve_uncached(episode_id, &key).await,
        }
    }

    async fn resolve_uncached(
        &self,
        episode_id: &str,
        key: &str,
    ) -> Result<EpisodeSourceSet, ResolutionError> {
        let inner = &*self.inner;
        let ttl_seconds = inner.ttl.as_secs();

        let resolved = inner
            .chain
            .resolve(|endpoint| {
                let url = endpoint.render(&[("id", episode_id)]);
                let name = endpoint.name.clone();
                let schema = endpoint.schema;
                async move {
                    let base = Url::parse(&url).map_err(|e| UpstreamError::InvalidBody {
                        endpoint: name.clone(),
                        message: format!("invalid endpoint URL: {e}"),
                    })?;
                    let body = inner.client.get_json(&name, &url).await?;
                    let raw = schema::parse_episode(schema, &name, body)?;
                    inner.normalizer.episode(raw, episode_id, &name, &base, ttl_seconds)
                }
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(episode_id, code = e.code(), error = %e, "Episode resolution failed");
            })?;

        let set = resolved.value;
        tracing::info!(
            episode_id,
            provider = %set.provider,
            sources = set.sources.len(),
            "Episode resolved"
        );

        cache_store(&*inner.cache, key, &set, inner.ttl).await;
        Ok(set)
    }
}
