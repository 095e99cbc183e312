//! Canonical episode source model
//!
//! Everything here is produced by the normalization step; upstream shapes
//! never leak past it. Every URL stored in these types already points at the
//! stream proxy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container format of a playable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Hls,
    Mp4,
    Webm,
}

impl MediaType {
    /// Derive the media type from the URL path extension.
    ///
    /// The query string and fragment are ignored; unknown or missing
    /// extensions default to HLS.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if path.ends_with(".mp4") {
            Self::Mp4
        } else if path.ends_with(".webm") {
            Self::Webm
        } else {
            Self::Hls
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hls => "hls",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub language_code: String,
    pub url: String,
    pub label: String,
    pub kind: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    pub url: String,
    pub quality: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub subtitles: Vec<SubtitleTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Fully resolved source list for one episode.
///
/// Replaced wholesale on refresh; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeSourceSet {
    pub episode_id: String,
    pub title: String,
    pub description: String,
    pub sources: Vec<VideoSource>,
    pub canonical_page_url: Option<String>,
    pub resolved_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    /// Name of the provider endpoint that produced this set.
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(MediaType::from_url("http://cdn/x.m3u8"), MediaType::Hls);
        assert_eq!(MediaType::from_url("http://cdn/x.MP4"), MediaType::Mp4);
        assert_eq!(MediaType::from_url("http://cdn/x.webm?sig=1"), MediaType::Webm);
        assert_eq!(MediaType::from_url("http://cdn/x.mp4#t=10"), MediaType::Mp4);
        assert_eq!(MediaType::from_url("http://cdn/playlist"), MediaType::Hls);
        // extension must be on the path, not the query
        assert_eq!(MediaType::from_url("http://cdn/play?f=x.mp4"), MediaType::Hls);
    }

    #[test]
    fn test_video_source_serializes_camel_case() {
        let source = VideoSource {
            url: "/proxy?url=x".to_string(),
            quality: "720p".to_string(),
            media_type: MediaType::Mp4,
            subtitles: vec![],
            bitrate: None,
            codec: None,
            size_bytes: Some(1024),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["mediaType"], "mp4");
        assert_eq!(json["sizeBytes"], 1024);
        assert!(json.get("bitrate").is_none());
    }
}
