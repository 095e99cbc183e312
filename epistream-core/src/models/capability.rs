//! Per-episode capability model (qualities, voices, subtitles, direct stream)

use serde::{Deserialize, Serialize};

use super::{Delivery, SubtitleTrack};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Full episode source list, owned by the source resolver.
    Sources,
    Qualities,
    Voices,
    Subtitles,
    Stream,
}

impl Capability {
    /// Capabilities served by the aggregator.
    pub const AGGREGATED: [Self; 4] = [Self::Qualities, Self::Voices, Self::Subtitles, Self::Stream];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sources => "episode",
            Self::Qualities => "qualities",
            Self::Voices => "voices",
            Self::Subtitles => "subtitles",
            Self::Stream => "stream",
        }
    }

    /// Whether a static fallback value is safe for this capability.
    ///
    /// A made-up quality list or stream URL would point players at media
    /// that does not exist, so those must surface the failure instead.
    #[must_use]
    pub const fn allows_fallback(self) -> bool {
        matches!(self, Self::Voices | Self::Subtitles)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache-key placeholder for an optional parameter that was not given.
/// Request validation never accepts `~` in a parameter value.
pub const ABSENT_PARAM: &str = "~";

fn slot(value: Option<&String>) -> &str {
    value.map_or(ABSENT_PARAM, String::as_str)
}

/// Inputs of a capability lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub anime_id: String,
    pub episode: String,
    pub quality: Option<String>,
    pub voice: Option<String>,
    pub language: Option<String>,
}

impl CapabilityRequest {
    #[must_use]
    pub fn new(anime_id: impl Into<String>, episode: impl Into<String>) -> Self {
        Self {
            anime_id: anime_id.into(),
            episode: episode.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: Option<String>) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Optional parameters that distinguish cache entries.
    ///
    /// Positional: an absent slot is [`ABSENT_PARAM`], so a value can never
    /// shift into a neighbouring slot.
    #[must_use]
    pub fn extra_params(&self, capability: Capability) -> Vec<&str> {
        match capability {
            Capability::Stream => vec![slot(self.quality.as_ref()), slot(self.voice.as_ref())],
            Capability::Subtitles => vec![slot(self.language.as_ref())],
            Capability::Sources | Capability::Qualities | Capability::Voices => Vec::new(),
        }
    }

    /// Values available to endpoint URL templates.
    #[must_use]
    pub fn template_vars(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("anime_id", self.anime_id.as_str()),
            ("episode", self.episode.as_str()),
            ("quality", self.quality.as_deref().unwrap_or_default()),
            ("voice", self.voice.as_deref().unwrap_or_default()),
            ("language", self.language.as_deref().unwrap_or_default()),
        ]
    }
}

/// Direct stream location for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Proxy-rewritten URL handed to clients.
    pub video_url: String,
    /// Raw upstream URL, used only when piping server-side.
    pub upstream_url: String,
    pub quality: String,
    pub voice: String,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum CapabilityPayload {
    Qualities(Vec<String>),
    Voices(Vec<String>),
    Subtitles(Vec<SubtitleTrack>),
    Stream(StreamInfo),
}

impl CapabilityPayload {
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Qualities(_) => Capability::Qualities,
            Self::Voices(_) => Capability::Voices,
            Self::Subtitles(_) => Capability::Subtitles,
            Self::Stream(_) => Capability::Stream,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub payload: CapabilityPayload,
    /// Endpoint name, or `"fallback"` for the static default.
    pub source: String,
}

impl CapabilityResult {
    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.payload.capability()
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.source == crate::provider::FALLBACK_SOURCE
    }
}
