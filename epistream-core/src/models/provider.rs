//! Provider endpoint model

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use super::Capability;

/// Characters left untouched when substituting template values (RFC 3986
/// unreserved set).
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Response layout an endpoint speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// Payload at the top level of the body.
    #[default]
    Primary,
    /// Payload wrapped in a `data` envelope (older services).
    Legacy,
}

/// How a stream endpoint's result reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Return the proxied URL as JSON.
    #[default]
    Json,
    /// Pipe the upstream bytes through the stream proxy directly.
    Pipe,
}

/// One upstream endpoint in an ordered provider chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub name: String,
    pub url_template: String,
    pub capability: Capability,
    pub priority: u32,
    pub schema: SchemaKind,
    pub delivery: Delivery,
}

impl ProviderEndpoint {
    /// Substitute `{placeholder}` tokens with percent-encoded values.
    ///
    /// Placeholders without a value are replaced by an empty string; text
    /// between braces that is not a known placeholder is kept as-is.
    #[must_use]
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        render_template(&self.url_template, vars)
    }
}

pub(crate) fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    const PLACEHOLDERS: [&str; 6] = ["id", "anime_id", "episode", "quality", "voice", "language"];

    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        if PLACEHOLDERS.contains(&name) {
            let value = vars
                .iter()
                .find(|(k, _)| *k == name)
                .map_or("", |(_, v)| *v);
            out.extend(utf8_percent_encode(value, COMPONENT));
        } else {
            out.push('{');
            out.push_str(name);
            out.push('}');
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Sort endpoints by ascending priority. The sort is stable so equal
/// priorities keep their configured order.
pub fn order_endpoints(mut endpoints: Vec<ProviderEndpoint>) -> Vec<ProviderEndpoint> {
    endpoints.sort_by_key(|e| e.priority);
    endpoints
}
