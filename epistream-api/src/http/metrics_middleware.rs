//! Axum middleware for collecting HTTP request metrics.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use epistream_core::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};
use std::time::Instant;

/// Label for requests that matched no route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Middleware that records HTTP request count and duration.
///
/// Requests are labelled by their route template (`/episode/{id}`), never by
/// the raw path, so label cardinality is bounded by the route table.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = route_label(request.extensions().get::<MatchedPath>());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&path, &method, &status])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&path, &method, &status])
        .observe(start.elapsed().as_secs_f64());

    response
}

fn route_label(matched: Option<&MatchedPath>) -> String {
    matched.map_or_else(|| UNMATCHED_PATH.to_string(), |m| m.as_str().to_string())
}
