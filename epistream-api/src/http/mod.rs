// Module: http
// JSON routes for episodes and capabilities, plus the stream proxy

pub mod capability;
pub mod episode;
pub mod error;
pub mod health;
pub mod metrics_middleware;
pub mod proxy;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use epistream_core::{CapabilityAggregator, ResolutionError, SourceResolver};
use epistream_proxy::StreamProxy;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub resolver: SourceResolver,
    pub aggregator: CapabilityAggregator,
    pub proxy: StreamProxy,
    /// Mount point of the proxy route.
    pub proxy_path: String,
    pub cors_origin: String,
    /// Include per-endpoint attempt detail in error bodies.
    pub debug_errors: bool,
}

impl AppState {
    pub fn resolution_error(&self, err: ResolutionError) -> AppError {
        AppError::from_resolution(err, self.debug_errors)
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match origin {
        "*" => AllowOrigin::from(Any),
        exact => match HeaderValue::from_str(exact) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin = exact, "Invalid CORS origin, allowing any");
                AllowOrigin::from(Any)
            }
        },
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/episode/{id}", get(episode::get_episode))
        .route("/video", get(capability::get_video))
        .route("/qualities", get(capability::get_qualities))
        .route("/voices", get(capability::get_voices))
        .route("/subtitles", get(capability::get_subtitles))
        .layer(cors_layer(&state.cors_origin));

    // The proxy answers its own preflights and sets its own CORS headers.
    let proxy = Router::new().route(
        &state.proxy_path,
        get(proxy::proxy_stream).options(proxy::proxy_preflight),
    );

    Router::new()
        .merge(health::create_health_router())
        .merge(api)
        .merge(proxy)
        .layer(middleware::from_fn(metrics_middleware::metrics_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
