//! Capability Aggregator
//!
//! Each capability owns an independent provider chain. Voices and subtitles
//! may fall back to a static default when every provider fails; qualities
//! and stream have no safe default and surface the failure.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::{cache_lookup, cache_store};
use crate::cache::{CacheStore, KeyBuilder, SingleFlight};
use crate::config::ProvidersConfig;
use crate::error::{ResolutionError, UpstreamError};
use crate::metrics::MetricsSink;
use crate::models::{Capability, CapabilityPayload, CapabilityRequest, CapabilityResult, ProviderEndpoint};
use crate::provider::{schema, Normalizer, ProviderChain, UpstreamClient};
use crate::resilience::retry::RetryPolicy;
use crate::validation::{
    validate_anime_id, validate_episode, validate_language, validate_quality, validate_voice,
    ValidationResult,
};

#[derive(Clone)]
pub struct CapabilityAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    client: UpstreamClient,
    qualities: ProviderChain<CapabilityPayload>,
    voices: ProviderChain<CapabilityPayload>,
    subtitles: ProviderChain<CapabilityPayload>,
    stream: ProviderChain<CapabilityPayload>,
    normalizer: Normalizer,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<dyn MetricsSink>,
    ttl: Duration,
    single_flight: Option<SingleFlight<CapabilityResult, ResolutionError>>,
}

impl std::fmt::Debug for CapabilityAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityAggregator")
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

/// Construction parameters for [`CapabilityAggregator`].
pub struct AggregatorDeps {
    pub client: UpstreamClient,
    pub providers: ProvidersConfig,
    pub retry: RetryPolicy,
    pub normalizer: Normalizer,
    pub cache: Arc<dyn CacheStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub ttl: Duration,
    pub single_flight: bool,
}

impl CapabilityAggregator {
    #[must_use]
    pub fn new(deps: AggregatorDeps) -> Self {
        let chain = |capability: Capability| {
            ProviderChain::new(
                capability,
                deps.providers.endpoints_for(capability),
                deps.retry,
                Arc::clone(&deps.metrics),
            )
        };

        let voices = chain(Capability::Voices).with_fallback(
            deps.providers
                .voices_fallback
                .clone()
                .filter(|v| !v.is_empty())
                .map(CapabilityPayload::Voices),
        );
        let subtitles = chain(Capability::Subtitles).with_fallback(
            deps.providers
                .subtitles_fallback
                .then(|| CapabilityPayload::Subtitles(Vec::new())),
        );
        let qualities = chain(Capability::Qualities);
        let stream = chain(Capability::Stream);

        Self {
            inner: Arc::new(Inner {
                client: deps.client,
                qualities,
                voices,
                subtitles,
                stream,
                normalizer: deps.normalizer,
                cache: deps.cache,
                metrics: deps.metrics,
                ttl: deps.ttl,
                single_flight: deps.single_flight.then(SingleFlight::new),
            }),
        }
    }

    fn chain(&self, capability: Capability) -> Option<&ProviderChain<CapabilityPayload>> {
        match capability {
            Capability::Qualities => Some(&self.inner.qualities),
            Capability::Voices => Some(&self.inner.voices),
            Capability::Subtitles => Some(&self.inner.subtitles),
            Capability::Stream => Some(&self.inner.stream),
            Capability::Sources => None,
        }
    }

    /// Resolve one capability for one episode.
    pub async fn get_capability(
        &self,
        capability: Capability,
        request: &CapabilityRequest,
    ) -> Result<CapabilityResult, ResolutionError> {
        let Some(chain) = self.chain(capability) else {
            return Err(ResolutionError::InvalidInput(format!(
                "'{capability}' is not an aggregated capability"
            )));
        };
        validate_request(request).map_err(|e| ResolutionError::InvalidInput(e.to_string()))?;

        let key = KeyBuilder::capability(capability, request);
        if let Some(cached) =
            cache_lookup::<CapabilityResult>(&*self.inner.cache, &*self.inner.metrics, &key).await
        {
            return Ok(cached);
        }

        let work = self.resolve_uncached(chain, request, &key);
        match &self.inner.single_flight {
            Some(sf) => {
                sf.run(&key, work, || {
                    ResolutionError::Internal("concurrent resolution was abandoned".to_string())
                })
                .await
            }
            None => work.await,
        }
    }

    async fn resolve_uncached(
        &self,
        chain: &ProviderChain<CapabilityPayload>,
        request: &CapabilityRequest,
        key: &str,
    ) -> Result<CapabilityResult, ResolutionError> {
        let inner = &*self.inner;
        let capability = chain.capability();
        let vars = request.template_vars();

        let resolved = chain
            .resolve(|endpoint| {
                let url = endpoint.render(&vars);
                let endpoint = endpoint.clone();
                async move { inner.fetch(capability, &endpoint, &url, request).await }
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    capability = %capability,
                    anime_id = %request.anime_id,
                    episode = %request.episode,
                    code = e.code(),
                    error = %e,
                    "Capability resolution failed"
                );
            })?;

        let result = CapabilityResult {
            payload: resolved.value,
            source: resolved.source,
        };

        // static defaults are not worth pinning for a whole TTL
        if !result.is_fallback() {
            cache_store(&*inner.cache, key, &result, inner.ttl).await;
        }
        Ok(result)
    }
}

impl Inner {
    async fn fetch(
        &self,
        capability: Capability,
        endpoint: &ProviderEndpoint,
        url: &str,
        request: &CapabilityRequest,
    ) -> Result<CapabilityPayload, UpstreamError> {
        let name = endpoint.name.as_str();
        let base = Url::parse(url).map_err(|e| UpstreamError::InvalidBody {
            endpoint: name.to_string(),
            message: format!("invalid endpoint URL: {e}"),
        })?;
        let body = self.client.get_json(name, url).await?;
        let empty = || UpstreamError::Empty {
            endpoint: name.to_string(),
        };

        match capability {
            Capability::Qualities => {
                let qualities = schema::parse_qualities(endpoint.schema, name, body)?;
                if qualities.is_empty() {
                    return Err(empty());
                }
                Ok(CapabilityPayload::Qualities(qualities))
            }
            Capability::Voices => {
                let voices = schema::parse_voices(endpoint.schema, name, body)?;
                if voices.is_empty() {
                    return Err(empty());
                }
                Ok(CapabilityPayload::Voices(voices))
            }
            // an episode without subtitles is a valid answer
            Capability::Subtitles => {
                let raw = schema::parse_subtitles(endpoint.schema, name, body)?;
                Ok(CapabilityPayload::Subtitles(self.normalizer.subtitles(raw, &base)))
            }
            Capability::Stream => {
                let raw = schema::parse_stream(endpoint.schema, name, body)?;
                let info = self.normalizer.stream(
                    raw,
                    name,
                    &base,
                    request.quality.as_deref(),
                    request.voice.as_deref(),
                    endpoint.delivery,
                )?;
                Ok(CapabilityPayload::Stream(info))
            }
            Capability::Sources => Err(empty()),
        }
    }
}

fn validate_request(request: &CapabilityRequest) -> ValidationResult<()> {
    validate_anime_id(&request.anime_id)?;
    validate_episode(&request.episode)?;
    if let Some(quality) = &request.quality {
        validate_quality(quality)?;
    }
    if let Some(voice) = &request.voice {
        validate_voice(voice)?;
    }
    if let Some(language) = &request.language {
        validate_language(language)?;
    }
    Ok(())
}
