//! Builds client-facing URLs that route upstream media through the stream
//! proxy.

use percent_encoding::utf8_percent_encode;

use crate::config::ProxyConfig;
use crate::models::provider::COMPONENT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUrlBuilder {
    /// `{public_base_url}{public_path}?url=`
    prefix: String,
}

impl ProxyUrlBuilder {
    #[must_use]
    pub fn new(public_path: &str, public_base_url: Option<&str>) -> Self {
        let base = public_base_url.unwrap_or_default().trim_end_matches('/');
        Self {
            prefix: format!("{base}{public_path}?url="),
        }
    }

    #[must_use]
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(&config.public_path, config.public_base_url.as_deref())
    }

    /// Wrap an absolute upstream URL. Already-proxied URLs are returned
    /// unchanged so rewriting is idempotent.
    #[must_use]
    pub fn build(&self, upstream: &str) -> String {
        if self.is_proxied(upstream) {
            return upstream.to_string();
        }
        let mut out = String::with_capacity(self.prefix.len() + upstream.len() * 3 / 2);
        out.push_str(&self.prefix);
        out.extend(utf8_percent_encode(upstream, COMPONENT));
        out
    }

    #[must_use]
    pub fn is_proxied(&self, url: &str) -> bool {
        url.starts_with(&self.prefix)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for ProxyUrlBuilder {
    fn default() -> Self {
        Self::new("/proxy", None)
    }
}
