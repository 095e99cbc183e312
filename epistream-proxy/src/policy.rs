//! Content-type policy and request header shaping

use axum::http::{HeaderMap, HeaderValue};

/// MIME types treated as HLS manifests.
const HLS_TYPES: [&str; 4] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
];

/// Codings the proxy can decode before relaying.
const RELAYABLE_CODINGS: [&str; 4] = ["gzip", "deflate", "br", "identity"];

/// Allow/deny lists for upstream `Content-Type`.
#[derive(Debug, Clone)]
pub struct ContentPolicy {
    allowed: Vec<String>,
    denied: Vec<String>,
}

/// `"Text/HTML; charset=utf-8"` becomes `"text/html"`.
#[must_use]
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl ContentPolicy {
    #[must_use]
    pub fn new(allowed: &[String], denied: &[String]) -> Self {
        let norm = |list: &[String]| list.iter().map(|s| essence(s)).filter(|s| !s.is_empty()).collect();
        Self {
            allowed: norm(allowed),
            denied: norm(denied),
        }
    }

    /// Deny entries win over allow entries; a missing type is never allowed.
    #[must_use]
    pub fn permits(&self, content_type: Option<&str>) -> bool {
        let Some(mime) = content_type.map(essence).filter(|m| !m.is_empty()) else {
            return false;
        };
        if self.denied.iter().any(|d| *d == mime) {
            return false;
        }
        self.allowed.iter().any(|entry| match entry.strip_suffix("/*") {
            Some(top) => mime.split('/').next() == Some(top),
            None => *entry == mime,
        })
    }
}

/// HLS by MIME type, or by `.m3u8` path when the upstream labels it generically.
#[must_use]
pub fn is_hls_manifest(content_type: Option<&str>, path: &str) -> bool {
    let mime = content_type.map(essence).unwrap_or_default();
    if HLS_TYPES.contains(&mime.as_str()) {
        return true;
    }
    matches!(mime.as_str(), "text/plain" | "application/octet-stream")
        && path.to_ascii_lowercase().ends_with(".m3u8")
}

/// Keep only the client's codings the proxy can decode.
#[must_use]
pub fn filter_accept_encoding(value: &HeaderValue) -> Option<HeaderValue> {
    let raw = value.to_str().ok()?;
    let kept: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| {
            let coding = item.split(';').next().unwrap_or_default().trim();
            RELAYABLE_CODINGS.iter().any(|c| coding.eq_ignore_ascii_case(c))
        })
        .collect();
    if kept.is_empty() {
        return None;
    }
    HeaderValue::from_str(&kept.join(", ")).ok()
}

/// Copy a header value with CR and LF removed.
#[must_use]
pub fn sanitize(value: &HeaderValue) -> Option<HeaderValue> {
    let cleaned: Vec<u8> = value
        .as_bytes()
        .iter()
        .copied()
        .filter(|b| *b != b'\r' && *b != b'\n')
        .collect();
    HeaderValue::from_bytes(&cleaned).ok()
}

/// First value of `name`, sanitized.
#[must_use]
pub fn header(headers: &HeaderMap, name: &str) -> Option<HeaderValue> {
    headers.get(name).and_then(sanitize)
}
