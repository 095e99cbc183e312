//! HTTP surface: episode, capability and proxy routes plus health and metrics.

pub mod http;

pub use http::{create_router, AppError, AppResult, AppState};
