use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::{order_endpoints, Capability, Delivery, ProviderEndpoint, SchemaKind};
use crate::resilience::retry::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub providers: ProvidersConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Include per-endpoint attempt detail in error responses.
    pub debug_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            debug_errors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Empty means in-memory caching only.
    pub url: String,
    pub connect_timeout_seconds: u64,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_seconds: 5,
            key_prefix: "epistream:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub episode_ttl_seconds: u64,
    pub capability_ttl_seconds: u64,
    pub l1_max_capacity: u64,
    /// Collapse concurrent cache misses for the same key into one upstream walk.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            episode_ttl_seconds: 3600,
            capability_ttl_seconds: 1800,
            l1_max_capacity: 10_000,
            single_flight: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub user_agent: String,
    pub pool_max_idle_per_host: usize,
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_max_idle_per_host: 16,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub multiplier: f32,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            multiplier: 2.0,
            max_delay_ms: 4_000,
            jitter: true,
        }
    }
}

/// One configured endpoint; the capability comes from the list it sits in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub schema: SchemaKind,
    #[serde(default)]
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub episode: Vec<EndpointConfig>,
    pub qualities: Vec<EndpointConfig>,
    pub voices: Vec<EndpointConfig>,
    pub subtitles: Vec<EndpointConfig>,
    pub stream: Vec<EndpointConfig>,
    /// Served when every voices endpoint fails. `None` disables the fallback.
    pub voices_fallback: Option<Vec<String>>,
    /// Serve an empty subtitle list when every subtitles endpoint fails.
    pub subtitles_fallback: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            episode: Vec::new(),
            qualities: Vec::new(),
            voices: Vec::new(),
            subtitles: Vec::new(),
            stream: Vec::new(),
            voices_fallback: Some(vec!["original".to_string(), "english".to_string()]),
            subtitles_fallback: true,
        }
    }
}

impl ProvidersConfig {
    fn list(&self, capability: Capability) -> &[EndpointConfig] {
        match capability {
            Capability::Sources => &self.episode,
            Capability::Qualities => &self.qualities,
            Capability::Voices => &self.voices,
            Capability::Subtitles => &self.subtitles,
            Capability::Stream => &self.stream,
        }
    }

    /// Endpoints for one capability, ordered by priority.
    #[must_use]
    pub fn endpoints_for(&self, capability: Capability) -> Vec<ProviderEndpoint> {
        order_endpoints(
            self.list(capability)
                .iter()
                .map(|e| ProviderEndpoint {
                    name: e.name.clone(),
                    url_template: e.url.clone(),
                    capability,
                    priority: e.priority,
                    schema: e.schema,
                    delivery: e.delivery,
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path the proxy route is mounted on; rewritten URLs point here.
    pub public_path: String,
    /// Optional absolute origin prepended to rewritten URLs.
    pub public_base_url: Option<String>,
    /// When non-empty, only these hosts and their subdomains may be proxied.
    pub allowed_domains: Vec<String>,
    pub cors_origin: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_redirects: usize,
    pub default_referer: String,
    pub user_agent: String,
    /// MIME allow-list; entries ending in `/*` match the whole top-level type.
    pub allowed_content_types: Vec<String>,
    /// Never relayed even when a wildcard entry would match.
    pub denied_content_types: Vec<String>,
    pub rewrite_manifests: bool,
    pub max_manifest_bytes: usize,
    /// Resolve hostnames and refuse private/link-local targets.
    pub block_private_resolution: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            public_path: "/proxy".to_string(),
            public_base_url: None,
            allowed_domains: Vec::new(),
            cors_origin: "*".to_string(),
            timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            max_redirects: 5,
            default_referer: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_content_types: [
                "video/*",
                "audio/*",
                "text/*",
                "application/vnd.apple.mpegurl",
                "application/x-mpegurl",
                "application/octet-stream",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            denied_content_types: vec!["text/html".to_string(), "text/javascript".to_string()],
            rewrite_manifests: true,
            max_manifest_bytes: 5 * 1024 * 1024,
            block_private_resolution: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // EPISTREAM__SERVER__HTTP_PORT, EPISTREAM__PROXY__ALLOWED_DOMAINS=a.com,b.com
        builder = builder.add_source(
            Environment::with_prefix("EPISTREAM")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("proxy.allowed_domains")
                .with_list_parse_key("proxy.allowed_content_types")
                .with_list_parse_key("proxy.denied_content_types")
                .with_list_parse_key("providers.voices_fallback")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check for misconfigurations that would only surface at request time.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.cache.episode_ttl_seconds == 0 {
            errors.push("cache.episode_ttl_seconds must be greater than zero".to_string());
        }
        if self.cache.capability_ttl_seconds == 0 {
            errors.push("cache.capability_ttl_seconds must be greater than zero".to_string());
        }
        if self.upstream.timeout_ms == 0 {
            errors.push("upstream.timeout_ms must be greater than zero".to_string());
        }
        if self.retry.multiplier < 1.0 {
            errors.push("retry.multiplier must be at least 1.0".to_string());
        }
        if !self.proxy.public_path.starts_with('/') {
            errors.push("proxy.public_path must start with '/'".to_string());
        }

        let capabilities = std::iter::once(Capability::Sources).chain(Capability::AGGREGATED);
        for capability in capabilities {
            for endpoint in self.providers.endpoints_for(capability) {
                let probe = endpoint.render(&[
                    ("id", "x"),
                    ("anime_id", "x"),
                    ("episode", "1"),
                    ("quality", "auto"),
                    ("voice", "original"),
                    ("language", "en"),
                ]);
                match url::Url::parse(&probe) {
                    Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                    _ => errors.push(format!(
                        "providers.{}: endpoint '{}' has an invalid URL template",
                        capability, endpoint.name
                    )),
                }
                if endpoint.delivery == Delivery::Pipe && capability != Capability::Stream {
                    errors.push(format!(
                        "providers.{}: endpoint '{}' uses pipe delivery, which only stream endpoints support",
                        capability, endpoint.name
                    ));
                }
            }
        }

        for domain in &self.proxy.allowed_domains {
            let bare = !domain.is_empty()
                && domain
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
            if !bare {
                errors.push(format!(
                    "proxy.allowed_domains: '{domain}' is not a bare hostname"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }
}
