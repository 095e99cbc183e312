//! Capability endpoints: qualities, voices, subtitles and the direct stream

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use epistream_core::models::{
    Capability, CapabilityPayload, CapabilityRequest, CapabilityResult, Delivery,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::http::{AppError, AppResult, AppState};

/// Query parameters shared by every capability route.
#[derive(Debug, Default, Deserialize)]
pub struct CapabilityQuery {
    pub anime_id: Option<String>,
    pub episode: Option<String>,
    pub quality: Option<String>,
    pub voice: Option<String>,
    pub language: Option<String>,
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("Missing required parameter: {name}")))
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CapabilityQuery {
    pub fn into_request(self) -> AppResult<CapabilityRequest> {
        Ok(
            CapabilityRequest::new(required(self.anime_id, "anime_id")?, required(self.episode, "episode")?)
                .with_quality(optional(self.quality))
                .with_voice(optional(self.voice))
                .with_language(optional(self.language)),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub video_url: String,
    pub quality: String,
    pub voice: String,
    pub source: String,
}

async fn lookup(
    state: &AppState,
    capability: Capability,
    query: CapabilityQuery,
) -> AppResult<CapabilityResult> {
    let request = query.into_request()?;
    state
        .aggregator
        .get_capability(capability, &request)
        .await
        .map_err(|e| state.resolution_error(e))
}

/// `{success, <capability>: [...], source}`
fn list_response(result: CapabilityResult) -> AppResult<Json<Value>> {
    let (field, values) = match result.payload {
        CapabilityPayload::Qualities(v) => ("qualities", json!(v)),
        CapabilityPayload::Voices(v) => ("voices", json!(v)),
        CapabilityPayload::Subtitles(v) => ("subtitles", json!(v)),
        CapabilityPayload::Stream(_) => {
            return Err(AppError::internal("stream payload on a list route"));
        }
    };
    let mut body = json!({ "success": true, "source": result.source });
    body[field] = values;
    Ok(Json(body))
}

/// GET /qualities
pub async fn get_qualities(
    State(state): State<AppState>,
    Query(query): Query<CapabilityQuery>,
) -> AppResult<Json<Value>> {
    list_response(lookup(&state, Capability::Qualities, query).await?)
}

/// GET /voices
pub async fn get_voices(
    State(state): State<AppState>,
    Query(query): Query<CapabilityQuery>,
) -> AppResult<Json<Value>> {
    list_response(lookup(&state, Capability::Voices, query).await?)
}

/// GET /subtitles
pub async fn get_subtitles(
    State(state): State<AppState>,
    Query(query): Query<CapabilityQuery>,
) -> AppResult<Json<Value>> {
    list_response(lookup(&state, Capability::Subtitles, query).await?)
}

/// GET /video - JSON with a proxied URL, or the bytes themselves for
/// pipe-delivery endpoints.
pub async fn get_video(
    State(state): State<AppState>,
    Query(query): Query<CapabilityQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let result = lookup(&state, Capability::Stream, query).await?;
    let CapabilityPayload::Stream(info) = result.payload else {
        return Err(AppError::internal("unexpected payload for stream capability"));
    };

    if info.delivery == Delivery::Pipe {
        let response = match state.proxy.stream_through(&info.upstream_url, &headers).await {
            Ok(response) => response,
            Err(e) => state.proxy.error_response(e),
        };
        return Ok(response);
    }

    Ok(Json(VideoResponse {
        video_url: info.video_url,
        quality: info.quality,
        voice: info.voice,
        source: result.source,
    })
    .into_response())
}
