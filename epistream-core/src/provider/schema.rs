//! Per-schema response adapters
//!
//! Each adapter turns one upstream body layout into the raw intermediate
//! types below. Every field is looked up through an ordered alias list and
//! the first alias carrying a usable value wins, so bodies that repeat a
//! field under two names still decode. Unknown fields are ignored. List
//! entries are decoded one at a time so a single malformed entry is dropped
//! instead of failing the whole body.

use serde_json::{Map, Value};

use crate::error::UpstreamError;
use crate::models::SchemaKind;

type Object = Map<String, Value>;

const URL_ALIASES: &[&str] = &["file", "url", "src", "link", "stream_url"];
const QUALITY_ALIASES: &[&str] = &["quality", "label", "resolution", "res"];
const SOURCE_SUBTITLE_ALIASES: &[&str] = &["subtitles", "tracks", "captions"];
const SIZE_ALIASES: &[&str] = &["size_bytes", "size", "filesize"];
const SUBTITLE_URL_ALIASES: &[&str] = &["file", "url", "src"];
const LANGUAGE_ALIASES: &[&str] = &["lang", "language", "srclang", "language_code"];
const LABEL_ALIASES: &[&str] = &["label", "name"];
const DEFAULT_ALIASES: &[&str] = &["default", "is_default"];
const STREAM_URL_ALIASES: &[&str] = &["url", "video_url", "file", "stream"];
const VOICE_ALIASES: &[&str] = &["voice", "dub", "audio"];

/// Episode metadata before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEpisode {
    pub title: Option<String>,
    pub description: Option<String>,
    pub page_url: Option<String>,
    pub duration: Option<f64>,
    pub episode_number: Option<u32>,
    pub season: Option<u32>,
    pub sources: Vec<RawSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSource {
    pub url: Option<String>,
    pub quality: Option<String>,
    pub subtitles: Vec<RawSubtitle>,
    pub bitrate: Option<u64>,
    pub codec: Option<String>,
    pub size_bytes: Option<u64>,
}

impl RawSource {
    fn from_object(map: &Object) -> Self {
        Self {
            url: pick_string(map, URL_ALIASES),
            quality: pick(map, QUALITY_ALIASES, label_from_value),
            subtitles: pick(map, SOURCE_SUBTITLE_ALIASES, |v| v.as_array().cloned())
                .map(|items| decode_entries(items, RawSubtitle::from_object))
                .unwrap_or_default(),
            bitrate: pick(map, &["bitrate"], lenient_u64),
            codec: pick_string(map, &["codec"]),
            size_bytes: pick(map, SIZE_ALIASES, lenient_u64),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSubtitle {
    pub url: Option<String>,
    pub language: Option<String>,
    pub label: Option<String>,
    pub kind: Option<String>,
    pub default: bool,
}

impl RawSubtitle {
    fn from_object(map: &Object) -> Self {
        Self {
            url: pick_string(map, SUBTITLE_URL_ALIASES),
            language: pick_string(map, LANGUAGE_ALIASES),
            label: pick_string(map, LABEL_ALIASES),
            kind: pick_string(map, &["kind"]),
            default: pick(map, DEFAULT_ALIASES, lenient_bool).unwrap_or(false),
        }
    }
}

/// Stream location before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStream {
    pub url: Option<String>,
    pub quality: Option<String>,
    pub voice: Option<String>,
}

impl RawStream {
    fn from_object(map: &Object) -> Self {
        Self {
            url: pick_string(map, STREAM_URL_ALIASES),
            quality: pick(map, &["quality"], label_from_value),
            voice: pick_string(map, VOICE_ALIASES),
        }
    }
}

/// First alias, in order, whose value `read` accepts.
fn pick<T>(map: &Object, aliases: &[&str], read: impl Fn(&Value) -> Option<T>) -> Option<T> {
    aliases.iter().filter_map(|alias| map.get(*alias)).find_map(read)
}

fn pick_string(map: &Object, aliases: &[&str]) -> Option<String> {
    pick(map, aliases, |v| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn invalid(endpoint: &str, message: impl Into<String>) -> UpstreamError {
    UpstreamError::InvalidBody {
        endpoint: endpoint.to_string(),
        message: message.into(),
    }
}

fn expect_object(endpoint: &str, body: Value) -> Result<Object, UpstreamError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(invalid(endpoint, "expected a JSON object")),
    }
}

/// Decode entries independently; anything that is not an object is dropped.
fn decode_entries<T>(entries: Vec<Value>, decode: fn(&Object) -> T) -> Vec<T> {
    let total = entries.len();
    let decoded: Vec<T> = entries
        .iter()
        .filter_map(Value::as_object)
        .map(decode)
        .collect();
    if decoded.len() < total {
        tracing::debug!(dropped = total - decoded.len(), "Dropped undecodable entries");
    }
    decoded
}

fn entry_list(map: &Object, aliases: &[&str]) -> Vec<RawSource> {
    pick(map, aliases, |v| v.as_array().cloned())
        .map(|items| decode_entries(items, RawSource::from_object))
        .unwrap_or_default()
}

/// Parse an episode body according to `schema`.
pub fn parse_episode(
    schema: SchemaKind,
    endpoint: &str,
    body: Value,
) -> Result<RawEpisode, UpstreamError> {
    match schema {
        SchemaKind::Primary => {
            let map = expect_object(endpoint, body)?;
            Ok(RawEpisode {
                title: pick_string(&map, &["title"]),
                description: pick_string(&map, &["description"]),
                page_url: pick_string(&map, &["url", "page_url", "source_url"]),
                duration: pick(&map, &["duration"], lenient_f64),
                episode_number: pick(&map, &["episode_number", "number"], lenient_u32),
                season: pick(&map, &["season"], lenient_u32),
                sources: entry_list(&map, &["sources"]),
            })
        }
        SchemaKind::Legacy => {
            let map = expect_object(endpoint, unwrap_schema(schema, endpoint, body)?)?;
            Ok(RawEpisode {
                title: pick_string(&map, &["name"]),
                description: pick_string(&map, &["synopsis"]),
                page_url: pick_string(&map, &["link"]),
                duration: pick(&map, &["duration"], lenient_f64),
                episode_number: pick(&map, &["number"], lenient_u32),
                season: pick(&map, &["season"], lenient_u32),
                sources: entry_list(&map, &["files"]),
            })
        }
    }
}

/// Locate the list for a capability: a bare array, or the first aliased
/// field holding one. Legacy bodies are unwrapped from `data` first.
fn capability_list(
    schema: SchemaKind,
    endpoint: &str,
    body: Value,
    fields: &[&str],
) -> Result<Vec<Value>, UpstreamError> {
    let body = unwrap_schema(schema, endpoint, body)?;
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => fields
            .iter()
            .find_map(|field| match map.remove(*field) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| invalid(endpoint, format!("expected one of {fields:?}"))),
        _ => Err(invalid(endpoint, "expected an object or array")),
    }
}

fn unwrap_schema(schema: SchemaKind, endpoint: &str, body: Value) -> Result<Value, UpstreamError> {
    match schema {
        SchemaKind::Primary => Ok(body),
        SchemaKind::Legacy => match body {
            Value::Object(mut map) => map
                .remove("data")
                .ok_or_else(|| invalid(endpoint, "missing `data` envelope")),
            _ => Err(invalid(endpoint, "missing `data` envelope")),
        },
    }
}

/// Quality labels; numbers become `"{n}p"`.
pub fn parse_qualities(
    schema: SchemaKind,
    endpoint: &str,
    body: Value,
) -> Result<Vec<String>, UpstreamError> {
    let items = capability_list(schema, endpoint, body, &["qualities", "available_qualities", "items"])?;
    Ok(items.iter().filter_map(label_from_value).collect())
}

/// Voice names from strings or `{name|title}` objects.
pub fn parse_voices(
    schema: SchemaKind,
    endpoint: &str,
    body: Value,
) -> Result<Vec<String>, UpstreamError> {
    let items = capability_list(schema, endpoint, body, &["voices", "dubs", "audio", "items"])?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(map) => ["name", "title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

pub fn parse_subtitles(
    schema: SchemaKind,
    endpoint: &str,
    body: Value,
) -> Result<Vec<RawSubtitle>, UpstreamError> {
    let items = capability_list(schema, endpoint, body, &["subtitles", "tracks", "captions", "items"])?;
    Ok(decode_entries(items, RawSubtitle::from_object))
}

pub fn parse_stream(
    schema: SchemaKind,
    endpoint: &str,
    body: Value,
) -> Result<RawStream, UpstreamError> {
    let map = expect_object(endpoint, unwrap_schema(schema, endpoint, body)?)?;
    Ok(RawStream::from_object(&map))
}

fn label_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n.as_u64().map(|n| format!("{n}p")),
        _ => None,
    }
}

fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_u32(value: &Value) -> Option<u32> {
    lenient_u64(value).and_then(|n| u32::try_from(n).ok())
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_u64() == Some(1)),
        Value::String(s) => Some(matches!(s.as_str(), "true" | "1" | "yes")),
        _ => None,
    }
}
