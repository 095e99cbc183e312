//! Cache key scheme
//!
//! - `episode:{id}` for full source sets
//! - `{capability}:{anime_id}:{episode}[:{slot}...]` for capability results,
//!   where stream keys carry `{quality}:{voice}` and subtitle keys
//!   `{language}`, with `~` standing in for an absent value
//!
//! Keys are logical; the Redis store adds its own deployment prefix.

use crate::models::{Capability, CapabilityRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyBuilder;

impl KeyBuilder {
    #[must_use]
    pub fn episode(episode_id: &str) -> String {
        format!("{}:{episode_id}", Capability::Sources.as_str())
    }

    #[must_use]
    pub fn capability(capability: Capability, request: &CapabilityRequest) -> String {
        let mut key = format!(
            "{}:{}:{}",
            capability.as_str(),
            request.anime_id,
            request.episode
        );
        for extra in request.extra_params(capability) {
            key.push(':');
            key.push_str(extra);
        }
        key
    }

    /// Leading segment of a key, used as the metrics namespace.
    #[must_use]
    pub fn namespace(key: &str) -> &str {
        key.split(':').next().unwrap_or(key)
    }
}
