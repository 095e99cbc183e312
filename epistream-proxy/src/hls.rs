//! HLS manifest rewriting
//!
//! Every segment, key, map and rendition URI in a playlist is resolved
//! against the manifest URL and routed back through the proxy, so players
//! never talk to the upstream host directly.

use epistream_core::ProxyUrlBuilder;
use url::Url;

/// Rewrite URLs inside an M3U8 playlist so they proxy through the server.
#[must_use]
pub fn rewrite_manifest(manifest: &str, base: &Url, urls: &ProxyUrlBuilder) -> String {
    let mut output = String::with_capacity(manifest.len() * 2);

    for line in manifest.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            output.push_str(&rewrite_uri_attribute(line, base, urls));
        } else if trimmed.is_empty() {
            output.push_str(line);
        } else {
            output.push_str(&proxied(trimmed, base, urls));
        }
        output.push('\n');
    }

    output
}

fn proxied(raw: &str, base: &Url, urls: &ProxyUrlBuilder) -> String {
    if urls.is_proxied(raw) {
        return raw.to_string();
    }
    match base.join(raw) {
        Ok(abs) if matches!(abs.scheme(), "http" | "https") => urls.build(abs.as_str()),
        // data: URIs and friends stay inline
        _ => raw.to_string(),
    }
}

/// Rewrite any `URI="..."` values found in a tag line.
fn rewrite_uri_attribute(line: &str, base: &Url, urls: &ProxyUrlBuilder) -> String {
    const PATTERN: &str = "URI=\"";
    let mut result = String::with_capacity(line.len());
    let mut remaining = line;

    while let Some(start) = remaining.find(PATTERN) {
        result.push_str(&remaining[..start + PATTERN.len()]);
        remaining = &remaining[start + PATTERN.len()..];

        if let Some(end) = remaining.find('"') {
            result.push_str(&proxied(&remaining[..end], base, urls));
            result.push('"');
            remaining = &remaining[end + 1..];
        } else {
            result.push_str(remaining);
            remaining = "";
        }
    }

    result.push_str(remaining);
    result
}
