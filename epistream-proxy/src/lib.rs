//! Stream proxy
//!
//! Re-streams an upstream URL to the client. Every target, and every
//! redirect hop, passes the [`TargetGate`] before a connection is opened;
//! responses are only relayed when their content type is on the allow-list.
//! HLS manifests are rewritten so their segments come back through here.

pub mod error;
pub mod hls;
pub mod policy;
pub mod relay;

pub use error::ProxyError;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use epistream_core::config::ProxyConfig;
use epistream_core::validation::{TargetGate, ValidationError};
use epistream_core::{MetricsSink, ProxyUrlBuilder};
use futures::StreamExt;
use url::Url;

use crate::policy::{filter_accept_encoding, is_hls_manifest, ContentPolicy};
use crate::relay::{copy_headers, MeteredStream};

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const EXPOSED_HEADERS: &str = "Content-Length, Content-Range, Accept-Ranges, Content-Type";

/// Inbound request fields forwarded upstream.
#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub target_url: String,
    pub range: Option<HeaderValue>,
    pub referer: Option<HeaderValue>,
    pub user_agent: Option<HeaderValue>,
    pub accept_encoding: Option<HeaderValue>,
}

impl ProxyRequest {
    #[must_use]
    pub fn from_headers(target_url: impl Into<String>, headers: &HeaderMap) -> Self {
        let get = |name: header::HeaderName| policy::header(headers, name.as_str());
        Self {
            target_url: target_url.into(),
            range: get(header::RANGE),
            referer: get(header::REFERER),
            user_agent: get(header::USER_AGENT),
            accept_encoding: get(header::ACCEPT_ENCODING),
        }
    }
}

/// A redirect hop refused by the gate.
#[derive(Debug)]
struct RedirectBlocked(String);

impl std::fmt::Display for RedirectBlocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "redirect blocked: {}", self.0)
    }
}

impl std::error::Error for RedirectBlocked {}

#[derive(Clone)]
pub struct StreamProxy {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    gate: TargetGate,
    content: ContentPolicy,
    urls: ProxyUrlBuilder,
    cors_origin: HeaderValue,
    default_referer: Option<HeaderValue>,
    user_agent: HeaderValue,
    timeout: Duration,
    rewrite_manifests: bool,
    max_manifest_bytes: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for StreamProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProxy")
            .field("gate", &self.inner.gate)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

fn reason(err: ValidationError) -> String {
    match err {
        ValidationError::Forbidden(reason) => reason,
        other => other.to_string(),
    }
}

/// Follow at most `max_redirects` hops, each of which must pass the gate.
fn redirect_policy(gate: TargetGate, max_redirects: usize) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error("too many redirects");
        }
        match gate.check(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(e) => {
                tracing::warn!(url = %attempt.url(), error = %e, "Blocked proxy redirect");
                attempt.error(RedirectBlocked(reason(e)))
            }
        }
    })
}

fn find_cause<'a, T: std::error::Error + 'static>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<T>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn classify(err: reqwest::Error) -> ProxyError {
    if let Some(blocked) = find_cause::<RedirectBlocked>(&err) {
        return ProxyError::Forbidden(blocked.0.clone());
    }
    if err.is_timeout() {
        return ProxyError::UpstreamTimeout;
    }
    ProxyError::Upstream(err.without_url().to_string())
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value)
        .map_err(|_| ProxyError::Internal(format!("proxy.{field} is not a valid header value")))
}

impl StreamProxy {
    pub fn new(config: &ProxyConfig, metrics: Arc<dyn MetricsSink>) -> Result<Self, ProxyError> {
        let gate = TargetGate::new(&config.allowed_domains)
            .with_private_resolution_check(config.block_private_resolution);
        let timeout = Duration::from_millis(config.timeout_ms);

        // The overall timeout bounds time-to-headers; an idle body is bounded
        // by the read timeout so long streams are not cut off.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(timeout)
            .redirect(redirect_policy(gate.clone(), config.max_redirects))
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {e}")))?;

        let default_referer = if config.default_referer.is_empty() {
            None
        } else {
            Some(header_value("default_referer", &config.default_referer)?)
        };

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                gate,
                content: ContentPolicy::new(&config.allowed_content_types, &config.denied_content_types),
                urls: ProxyUrlBuilder::from_config(config),
                cors_origin: header_value("cors_origin", &config.cors_origin)?,
                default_referer,
                user_agent: header_value("user_agent", &config.user_agent)?,
                timeout,
                rewrite_manifests: config.rewrite_manifests,
                max_manifest_bytes: config.max_manifest_bytes,
                metrics,
            }),
        })
    }

    /// Validate `target`, fetch it and pipe the response back.
    pub async fn stream_through(
        &self,
        target: &str,
        headers: &HeaderMap,
    ) -> Result<Response, ProxyError> {
        self.relay(ProxyRequest::from_headers(target, headers)).await
    }

    pub async fn relay(&self, request: ProxyRequest) -> Result<Response, ProxyError> {
        let result = self.inner.fetch(&request).await;
        if let Err(e) = &result {
            if e.outcome() == "rejected" {
                tracing::info!(code = e.code(), error = %e, "Proxy request rejected");
            } else {
                tracing::warn!(code = e.code(), error = %e, "Proxy request failed");
            }
            self.inner.metrics.record_proxy(e.outcome(), 0);
        }
        result
    }

    /// CORS preflight answer; never touches the upstream.
    #[must_use]
    pub fn preflight(&self) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        self.inner.apply_cors(headers);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, HEAD, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Range, Content-Type, Accept-Encoding"),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
        response
    }

    /// JSON error body carrying the proxy's CORS headers.
    #[must_use]
    pub fn error_response(&self, err: ProxyError) -> Response {
        let mut response = err.into_response();
        self.inner.apply_cors(response.headers_mut());
        response
    }
}

impl Inner {
    async fn fetch(&self, request: &ProxyRequest) -> Result<Response, ProxyError> {
        let raw = request.target_url.trim();
        if raw.is_empty() {
            return Err(ProxyError::MissingUrl);
        }
        let target = self.gate.parse(raw)?;
        self.gate.check_resolved(&target).await?;

        let upstream = self.send(&target, request).await?;
        let status = upstream.status();
        if status.is_server_error() {
            return Err(ProxyError::UpstreamServerError(status));
        }
        if status.is_client_error() {
            return Err(ProxyError::UpstreamRejected(status));
        }
        if !status.is_success() {
            return Err(ProxyError::Upstream(format!("unexpected status {status}")));
        }

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !self.content.permits(content_type.as_deref()) {
            return Err(ProxyError::ContentType(
                content_type.unwrap_or_else(|| "<missing>".to_string()),
            ));
        }

        let final_url = upstream.url().clone();
        if self.rewrite_manifests
            && status == StatusCode::OK
            && is_hls_manifest(content_type.as_deref(), final_url.path())
        {
            return self.rewrite(upstream, &final_url).await;
        }

        Ok(self.stream(upstream))
    }

    async fn send(&self, target: &Url, request: &ProxyRequest) -> Result<reqwest::Response, ProxyError> {
        let user_agent = request.user_agent.clone().unwrap_or_else(|| self.user_agent.clone());
        let mut builder = self
            .client
            .get(target.clone())
            .header(header::USER_AGENT, user_agent);

        if let Some(referer) = self.referer_for(target, request) {
            builder = builder.header(header::REFERER, referer);
        }

        // byte ranges are only meaningful against the identity encoding
        if let Some(range) = &request.range {
            builder = builder
                .header(header::RANGE, range.clone())
                .header(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        } else if let Some(accept) = request.accept_encoding.as_ref().and_then(filter_accept_encoding) {
            builder = builder.header(header::ACCEPT_ENCODING, accept);
        }

        match tokio::time::timeout(self.timeout, builder.send()).await {
            Err(_) => Err(ProxyError::UpstreamTimeout),
            Ok(Err(e)) => Err(classify(e)),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Client referer, then the configured default, then the target's origin.
    fn referer_for(&self, target: &Url, request: &ProxyRequest) -> Option<HeaderValue> {
        request
            .referer
            .clone()
            .or_else(|| self.default_referer.clone())
            .or_else(|| HeaderValue::from_str(&format!("{}/", target.origin().ascii_serialization())).ok())
    }

    fn stream(&self, upstream: reqwest::Response) -> Response {
        let status = upstream.status();
        let mut headers = HeaderMap::new();
        copy_headers(upstream.headers(), &mut headers);
        self.apply_cors(&mut headers);

        let target = upstream.url().to_string();
        let body = MeteredStream::new(upstream.bytes_stream().boxed(), Arc::clone(&self.metrics), target);

        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    async fn rewrite(&self, mut upstream: reqwest::Response, base: &Url) -> Result<Response, ProxyError> {
        let limit = self.max_manifest_bytes;
        if upstream.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ProxyError::ManifestTooLarge(limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = upstream.chunk().await.map_err(classify)? {
            if body.len() + chunk.len() > limit {
                return Err(ProxyError::ManifestTooLarge(limit));
            }
            body.extend_from_slice(&chunk);
        }

        let rewritten = hls::rewrite_manifest(&String::from_utf8_lossy(&body), base, &self.urls);
        self.metrics.record_proxy("completed", rewritten.len() as u64);

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HLS_CONTENT_TYPE));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        self.apply_cors(&mut headers);

        let mut response = Response::new(Body::from(rewritten));
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn apply_cors(&self, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.cors_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
        if self.cors_origin != "*" {
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epistream_core::NoopMetrics;

    fn proxy(config: &ProxyConfig) -> StreamProxy {
        StreamProxy::new(config, Arc::new(NoopMetrics)).unwrap()
    }

    #[tokio::test]
    async fn test_literal_ip_targets_are_forbidden() {
        let mut config = ProxyConfig::default();
        config.allowed_domains = vec!["cdn.example".to_string()];
        let proxy = proxy(&config);

        for target in [
            "http://127.0.0.1/x",
            "http://[::1]/x",
            "http://2130706433/x",
            "http://0x7f.1/x",
            "ftp://cdn.example/x",
            "not a url",
        ] {
            let err = proxy.stream_through(target, &HeaderMap::new()).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::FORBIDDEN, "{target}");
        }
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let err = proxy(&ProxyConfig::default())
            .stream_through("  ", &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingUrl));
    }

    #[test]
    fn test_proxy_request_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=100-199"));
        headers.insert(header::COOKIE, HeaderValue::from_static("sid=1"));

        let req = ProxyRequest::from_headers("https://cdn.example/a.mp4", &headers);
        assert_eq!(req.range.unwrap(), "bytes=100-199");
        assert!(req.referer.is_none());
    }

    #[test]
    fn test_preflight_headers() {
        let response = proxy(&ProxyConfig::default()).preflight();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .contains("Range"));
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        let mut config = ProxyConfig::default();
        config.cors_origin = "bad\norigin".to_string();
        assert!(StreamProxy::new(&config, Arc::new(NoopMetrics)).is_err());
    }
}
