//! Prometheus metrics collection
//!
//! Components never aggregate anything themselves: they report events to a
//! [`MetricsSink`], and [`PrometheusMetrics`] turns those events into the
//! counters and histograms exposed on `/metrics`.

use std::sync::LazyLock;
use std::time::Duration;

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_with_registry, CounterVec, Encoder, HistogramVec, IntCounter, Registry,
    TextEncoder,
};

use crate::error::FailureKind;
use crate::models::Capability;

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// HTTP request duration histogram
pub static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["endpoint", "method", "status"],
        REGISTRY.clone()
    )
    .expect("Failed to register HTTP_REQUEST_DURATION")
});

/// HTTP request counter
pub static HTTP_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["endpoint", "method", "status"],
        REGISTRY.clone()
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL")
});

/// Upstream provider calls
pub mod provider {
    use super::{
        register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
        HistogramVec, LazyLock, REGISTRY,
    };

    /// One increment per HTTP attempt, retries included
    pub static PROVIDER_ATTEMPTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "provider_attempts_total",
            "Total number of upstream provider attempts",
            &["capability", "endpoint", "outcome"],
            REGISTRY.clone()
        )
        .expect("Failed to register PROVIDER_ATTEMPTS_TOTAL")
    });

    pub static PROVIDER_ATTEMPT_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
        register_histogram_vec_with_registry!(
            "provider_attempt_duration_seconds",
            "Upstream provider attempt duration in seconds",
            &["capability", "endpoint"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            REGISTRY.clone()
        )
        .expect("Failed to register PROVIDER_ATTEMPT_DURATION")
    });
}

/// Cache operations
pub mod cache {
    use super::{register_counter_vec_with_registry, CounterVec, LazyLock, REGISTRY};

    pub static CACHE_LOOKUPS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "cache_lookups_total",
            "Total number of cache lookups",
            &["namespace", "result"],
            REGISTRY.clone()
        )
        .expect("Failed to register CACHE_LOOKUPS_TOTAL")
    });
}

/// Stream proxy
pub mod proxy {
    use super::{
        register_counter_vec_with_registry, register_int_counter_with_registry, CounterVec,
        IntCounter, LazyLock, REGISTRY,
    };

    /// Labelled by the terminal state of each proxied request
    pub static PROXY_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "proxy_requests_total",
            "Total number of proxied requests by terminal state",
            &["outcome"],
            REGISTRY.clone()
        )
        .expect("Failed to register PROXY_REQUESTS_TOTAL")
    });

    pub static PROXY_BYTES_STREAMED: LazyLock<IntCounter> = LazyLock::new(|| {
        register_int_counter_with_registry!(
            "proxy_bytes_streamed_total",
            "Total number of body bytes relayed to clients",
            REGISTRY.clone()
        )
        .expect("Failed to register PROXY_BYTES_STREAMED")
    });
}

/// Result of one upstream HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(FailureKind),
}

impl AttemptOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(kind) => kind.as_str(),
        }
    }
}

/// Observability event emitted for every upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptEvent {
    pub capability: Capability,
    pub endpoint: String,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

/// External metrics collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn record_attempt(&self, event: &AttemptEvent);

    fn record_cache_lookup(&self, namespace: &str, hit: bool);

    /// `outcome` is the terminal state of the proxied request; `bytes` is
    /// the number of body bytes relayed before it was reached.
    fn record_proxy(&self, outcome: &str, bytes: u64);
}

/// Sink backed by the global Prometheus registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn record_attempt(&self, event: &AttemptEvent) {
        let capability = event.capability.as_str();
        provider::PROVIDER_ATTEMPTS_TOTAL
            .with_label_values(&[capability, &event.endpoint, event.outcome.as_str()])
            .inc();
        provider::PROVIDER_ATTEMPT_DURATION
            .with_label_values(&[capability, &event.endpoint])
            .observe(event.latency.as_secs_f64());
    }

    fn record_cache_lookup(&self, namespace: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        cache::CACHE_LOOKUPS_TOTAL
            .with_label_values(&[namespace, result])
            .inc();
    }

    fn record_proxy(&self, outcome: &str, bytes: u64) {
        proxy::PROXY_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
        proxy::PROXY_BYTES_STREAMED.inc_by(bytes);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_attempt(&self, _event: &AttemptEvent) {}

    fn record_cache_lookup(&self, _namespace: &str, _hit: bool) {}

    fn record_proxy(&self, _outcome: &str, _bytes: u64) {}
}

/// Expose metrics in Prometheus format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}
