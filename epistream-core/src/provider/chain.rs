//! Ordered provider chain with per-endpoint retry
//!
//! Endpoints are tried in priority order. Transient failures are retried
//! against the same endpoint under the chain's [`RetryPolicy`]; anything else
//! falls through to the next endpoint at once. When every endpoint fails the
//! optional static fallback is served, otherwise the last concrete cause is
//! surfaced.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{EndpointAttempt, ResolutionError, UpstreamError};
use crate::metrics::{AttemptEvent, AttemptOutcome, MetricsSink};
use crate::models::{Capability, ProviderEndpoint};
use crate::resilience::retry::{with_retry, RetryPolicy};

/// Source label used for static fallback values.
pub const FALLBACK_SOURCE: &str = "fallback";

/// Value produced by a chain along with who produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSuccess<T> {
    pub value: T,
    /// Endpoint name, or [`FALLBACK_SOURCE`].
    pub source: String,
}

impl<T> ChainSuccess<T> {
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.source == FALLBACK_SOURCE
    }
}

pub struct ProviderChain<T> {
    capability: Capability,
    endpoints: Vec<ProviderEndpoint>,
    retry: RetryPolicy,
    fallback: Option<T>,
    metrics: Arc<dyn MetricsSink>,
}

impl<T: Clone> ProviderChain<T> {
    /// Endpoints are re-sorted by priority; ties keep their given order.
    pub fn new(
        capability: Capability,
        mut endpoints: Vec<ProviderEndpoint>,
        retry: RetryPolicy,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        endpoints.sort_by_key(|e| e.priority);
        Self {
            capability,
            endpoints,
            retry,
            fallback: None,
            metrics,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Option<T>) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn endpoints(&self) -> &[ProviderEndpoint] {
        &self.endpoints
    }

    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.capability
    }

    /// Walk the chain. `call` performs one attempt against one endpoint and
    /// may be invoked several times per endpoint when retrying.
    pub async fn resolve<F, Fut>(&self, mut call: F) -> Result<ChainSuccess<T>, ResolutionError>
    where
        F: FnMut(&ProviderEndpoint) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempts = Vec::with_capacity(self.endpoints.len());
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let outcome = with_retry(
                &self.retry,
                || {
                    let started = Instant::now();
                    let fut = call(endpoint);
                    async move {
                        let result = fut.await;
                        self.record(endpoint, &result, started);
                        result
                    }
                },
                UpstreamError::is_transient,
                |err: &UpstreamError, delay| {
                    tracing::warn!(
                        capability = %self.capability,
                        endpoint = %endpoint.name,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Transient upstream failure, retrying"
                    );
                },
            )
            .await;

            match outcome.result {
                Ok(value) => {
                    tracing::debug!(
                        capability = %self.capability,
                        endpoint = %endpoint.name,
                        requests = outcome.calls,
                        "Provider succeeded"
                    );
                    return Ok(ChainSuccess {
                        value,
                        source: endpoint.name.clone(),
                    });
                }
                Err(err) => {
                    tracing::info!(
                        capability = %self.capability,
                        endpoint = %endpoint.name,
                        requests = outcome.calls,
                        error = %err,
                        "Provider failed, moving to next endpoint"
                    );
                    attempts.push(EndpointAttempt {
                        endpoint: endpoint.name.clone(),
                        requests: outcome.calls,
                        kind: err.kind(),
                        error: err.to_string(),
                    });
                    last_error = Some(err);
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            tracing::warn!(
                capability = %self.capability,
                failed = attempts.len(),
                "All providers failed, serving static fallback"
            );
            return Ok(ChainSuccess {
                value: fallback.clone(),
                source: FALLBACK_SOURCE.to_string(),
            });
        }

        match last_error {
            Some(last) => Err(ResolutionError::exhausted(last, attempts)),
            None => Err(ResolutionError::NotConfigured(self.capability.to_string())),
        }
    }

    fn record(&self, endpoint: &ProviderEndpoint, result: &Result<T, UpstreamError>, started: Instant) {
        let outcome = match result {
            Ok(_) => AttemptOutcome::Success,
            Err(e) => AttemptOutcome::Failed(e.kind()),
        };
        self.metrics.record_attempt(&AttemptEvent {
            capability: self.capability,
            endpoint: endpoint.name.clone(),
            outcome,
            latency: started.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::metrics::{MockMetricsSink, NoopMetrics};
    use crate::models::{Delivery, SchemaKind};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn endpoint(name: &str, priority: u32) -> ProviderEndpoint {
        ProviderEndpoint {
            name: name.to_string(),
            url_template: format!("https://{name}/{{anime_id}}"),
            capability: Capability::Voices,
            priority,
            schema: SchemaKind::Primary,
            delivery: Delivery::Json,
        }
    }

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_delay: Duration::from_millis(50),
            jitter: false,
        }
    }

    fn status(endpoint: &str, code: u16) -> UpstreamError {
        UpstreamError::Status {
            endpoint: endpoint.to_string(),
            status: code,
        }
    }

    #[tokio::test]
    async fn test_first_success_wins_in_priority_order() {
        let chain: ProviderChain<u32> = ProviderChain::new(
            Capability::Voices,
            vec![endpoint("legacy", 10), endpoint("primary", 1)],
            policy(0),
            Arc::new(NoopMetrics),
        );

        let result = chain
            .resolve(|e| {
                let name = e.name.clone();
                async move { if name == "primary" { Ok(1) } else { Ok(2) } }
            })
            .await
            .unwrap();
        assert_eq!(result.value, 1);
        assert_eq!(result.source, "primary");
    }

    #[tokio::test]
    async fn test_client_errors_skip_retry() {
        let calls = AtomicU32::new(0);
        let chain: ProviderChain<u32> = ProviderChain::new(
            Capability::Voices,
            vec![endpoint("primary", 0), endpoint("legacy", 1)],
            policy(3),
            Arc::new(NoopMetrics),
        );

        let result = chain
            .resolve(|e| {
                calls.fetch_add(1, Ordering::SeqCst);
                let name = e.name.clone();
                async move {
                    if name == "primary" {
                        Err(status(&name, 404))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.source, "legacy");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_cause() {
        let chain: ProviderChain<u32> = ProviderChain::new(
            Capability::Qualities,
            vec![endpoint("primary", 0), endpoint("legacy", 1)],
            policy(1),
            Arc::new(NoopMetrics),
        );

        let err = chain
            .resolve(|e| {
                let name = e.name.clone();
                async move { Err(status(&name, 502)) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::UpstreamServerError(_)));
        assert_eq!(err.last_cause(), Some(&status("legacy", 502)));
        let attempts = err.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].requests, 2);
        assert_eq!(attempts[1].kind, FailureKind::ServerError);
    }

    #[tokio::test]
    async fn test_fallback_served_when_all_fail() {
        let chain = ProviderChain::new(
            Capability::Voices,
            vec![endpoint("primary", 0)],
            policy(0),
            Arc::new(NoopMetrics),
        )
        .with_fallback(Some(vec!["original".to_string()]));

        let result = chain
            .resolve(|e| {
                let name = e.name.clone();
                async move { Err(UpstreamError::Timeout { endpoint: name }) }
            })
            .await
            .unwrap();
        assert!(result.is_fallback());
        assert_eq!(result.value, vec!["original".to_string()]);
    }

    #[tokio::test]
    async fn test_no_endpoints_is_not_configured() {
        let chain: ProviderChain<u32> =
            ProviderChain::new(Capability::Stream, vec![], policy(0), Arc::new(NoopMetrics));
        let err = chain.resolve(|_| async { Ok(1) }).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_every_attempt_emits_an_event() {
        let mut metrics = MockMetricsSink::new();
        metrics
            .expect_record_attempt()
            .withf(|event| {
                event.endpoint == "primary"
                    && event.outcome == AttemptOutcome::Failed(FailureKind::ServerError)
            })
            .times(3)
            .return_const(());
        metrics
            .expect_record_attempt()
            .withf(|event| event.endpoint == "legacy" && event.outcome == AttemptOutcome::Success)
            .times(1)
            .return_const(());

        let chain: ProviderChain<u32> = ProviderChain::new(
            Capability::Subtitles,
            vec![endpoint("primary", 0), endpoint("legacy", 1)],
            policy(2),
            Arc::new(metrics),
        );

        let result = chain
            .resolve(|e| {
                let name = e.name.clone();
                async move {
                    if name == "primary" {
                        Err(status(&name, 500))
                    } else {
                        Ok(1)
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }
}
