//! Stream proxy endpoint

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use epistream_proxy::ProxyError;
use serde::Deserialize;

use crate::http::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// GET /proxy?url=<encoded-url>
pub async fn proxy_stream(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(url) = query.url else {
        return state.proxy.error_response(ProxyError::MissingUrl);
    };
    match state.proxy.stream_through(&url, &headers).await {
        Ok(response) => response,
        Err(e) => state.proxy.error_response(e),
    }
}

/// OPTIONS /proxy - CORS preflight
pub async fn proxy_preflight(State(state): State<AppState>) -> Response {
    state.proxy.preflight()
}
