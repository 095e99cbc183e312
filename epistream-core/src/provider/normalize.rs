//! Shared normalization from raw adapter output to the canonical model
//!
//! Every URL that leaves this module points at the stream proxy.

use chrono::Utc;
use url::Url;

use super::schema::{RawEpisode, RawSource, RawStream, RawSubtitle};
use crate::error::UpstreamError;
use crate::models::{Delivery, EpisodeSourceSet, MediaType, StreamInfo, SubtitleTrack, VideoSource};
use crate::proxy_url::ProxyUrlBuilder;

pub const DEFAULT_QUALITY: &str = "auto";
pub const DEFAULT_VOICE: &str = "original";
const DEFAULT_LANGUAGE: &str = "und";
const TRACK_KINDS: [&str; 5] = ["subtitles", "captions", "descriptions", "chapters", "metadata"];

#[derive(Debug, Clone)]
pub struct Normalizer {
    proxy: ProxyUrlBuilder,
}

impl Normalizer {
    #[must_use]
    pub const fn new(proxy: ProxyUrlBuilder) -> Self {
        Self { proxy }
    }

    #[must_use]
    pub const fn proxy(&self) -> &ProxyUrlBuilder {
        &self.proxy
    }

    /// Build the episode source set, or `Empty` when no source survives.
    pub fn episode(
        &self,
        raw: RawEpisode,
        episode_id: &str,
        endpoint: &str,
        base: &Url,
        ttl_seconds: u64,
    ) -> Result<EpisodeSourceSet, UpstreamError> {
        let sources: Vec<VideoSource> = raw
            .sources
            .into_iter()
            .filter_map(|s| self.source(s, base))
            .collect();

        if sources.is_empty() {
            return Err(UpstreamError::Empty {
                endpoint: endpoint.to_string(),
            });
        }

        Ok(EpisodeSourceSet {
            episode_id: episode_id.to_string(),
            title: raw.title.unwrap_or_default().trim().to_string(),
            description: raw.description.unwrap_or_default().trim().to_string(),
            sources,
            canonical_page_url: raw.page_url.and_then(|u| absolutize(&u, base)),
            resolved_at: Utc::now(),
            ttl_seconds,
            duration: raw.duration,
            episode_number: raw.episode_number,
            season: raw.season,
            provider: endpoint.to_string(),
        })
    }

    /// Normalize one source; `None` drops it.
    #[must_use]
    pub fn source(&self, raw: RawSource, base: &Url) -> Option<VideoSource> {
        let Some(upstream) = raw.url.as_deref().and_then(|u| absolutize(u, base)) else {
            tracing::debug!(url = ?raw.url, "Dropping source without a usable URL");
            return None;
        };

        Some(VideoSource {
            media_type: MediaType::from_url(&upstream),
            url: self.proxy.build(&upstream),
            quality: raw
                .quality
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
            subtitles: self.subtitles(raw.subtitles, base),
            bitrate: raw.bitrate,
            codec: raw.codec.filter(|c| !c.trim().is_empty()),
            size_bytes: raw.size_bytes,
        })
    }

    /// Normalize subtitle entries independently, dropping invalid ones.
    #[must_use]
    pub fn subtitles(&self, raw: Vec<RawSubtitle>, base: &Url) -> Vec<SubtitleTrack> {
        raw.into_iter().filter_map(|s| self.subtitle(s, base)).collect()
    }

    fn subtitle(&self, raw: RawSubtitle, base: &Url) -> Option<SubtitleTrack> {
        let upstream = raw.url.as_deref().and_then(|u| absolutize(u, base))?;

        let language_code = raw
            .language
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let kind = raw
            .kind
            .map(|k| k.trim().to_ascii_lowercase())
            .filter(|k| TRACK_KINDS.contains(&k.as_str()))
            .unwrap_or_else(|| TRACK_KINDS[0].to_string());

        Some(SubtitleTrack {
            label: raw
                .label
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| language_code.clone()),
            url: self.proxy.build(&upstream),
            language_code,
            kind,
            is_default: raw.default,
        })
    }

    /// Build stream info, or `Empty` when no usable URL is present.
    pub fn stream(
        &self,
        raw: RawStream,
        endpoint: &str,
        base: &Url,
        requested_quality: Option<&str>,
        requested_voice: Option<&str>,
        delivery: Delivery,
    ) -> Result<StreamInfo, UpstreamError> {
        let upstream = raw
            .url
            .as_deref()
            .and_then(|u| absolutize(u, base))
            .ok_or_else(|| UpstreamError::Empty {
                endpoint: endpoint.to_string(),
            })?;

        Ok(StreamInfo {
            video_url: self.proxy.build(&upstream),
            upstream_url: upstream,
            quality: raw
                .quality
                .or_else(|| requested_quality.map(str::to_string))
                .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
            voice: raw
                .voice
                .filter(|v| !v.trim().is_empty())
                .or_else(|| requested_voice.map(str::to_string))
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            delivery,
        })
    }
}

/// Resolve a raw URL to an absolute http(s) URL.
///
/// Protocol-relative URLs get `https:`; relative paths are joined against
/// the endpoint URL. Anything else (other schemes, garbage) is rejected.
#[must_use]
pub fn absolutize(raw: &str, base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("https://{rest}"))
    } else {
        match Url::parse(raw) {
            Err(url::ParseError::RelativeUrlWithoutBase) => base.join(raw),
            other => other,
        }
    }
    .ok()?;

    if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() {
        Some(parsed.to_string())
    } else {
        None
    }
}
