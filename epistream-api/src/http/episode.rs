//! Episode source endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use epistream_core::models::{EpisodeSourceSet, VideoSource};
use serde::Serialize;

use crate::http::{AppResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub sources: Vec<VideoSource>,
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
}

impl From<EpisodeSourceSet> for EpisodeResponse {
    fn from(set: EpisodeSourceSet) -> Self {
        Self {
            id: set.episode_id,
            title: set.title,
            description: set.description,
            sources: set.sources,
            source_url: set.canonical_page_url,
            duration: set.duration,
            episode_number: set.episode_number,
            season: set.season,
        }
    }
}

/// GET /episode/{id}
pub async fn get_episode(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EpisodeResponse>> {
    let set = state
        .resolver
        .resolve(&id)
        .await
        .map_err(|e| state.resolution_error(e))?;
    Ok(Json(set.into()))
}
