pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod proxy_url;
pub mod resilience;
pub mod service;
pub mod validation;

pub use cache::{CacheStore, KeyBuilder, MemoryCacheStore};
pub use config::Config;
pub use error::{CacheError, FailureKind, ResolutionError, UpstreamError};
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use proxy_url::ProxyUrlBuilder;
pub use service::{CapabilityAggregator, SourceResolver};
