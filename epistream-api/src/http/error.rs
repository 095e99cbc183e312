// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use epistream_core::error::EndpointAttempt;
use epistream_core::ResolutionError;
use serde::Serialize;
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code and machine-readable code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    /// Per-endpoint detail, only filled in debug mode.
    pub attempts: Option<Vec<EndpointAttempt>>,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            attempts: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Map a resolution failure, keeping the attempt log when `debug` is set.
    pub fn from_resolution(err: ResolutionError, debug: bool) -> Self {
        let status = match &err {
            ResolutionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ResolutionError::UpstreamNotFound(_) => StatusCode::NOT_FOUND,
            ResolutionError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ResolutionError::UpstreamRejected(_) => err
                .upstream_status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ResolutionError::UpstreamServerError(_) | ResolutionError::Network(_) => {
                StatusCode::BAD_GATEWAY
            }
            ResolutionError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ResolutionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &err {
            ResolutionError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other if other.exhaustion().is_some() && !debug => generic_message(other).to_string(),
            other => other.to_string(),
        };

        Self {
            status,
            code: err.code(),
            message,
            attempts: (debug && !err.attempts().is_empty()).then(|| err.attempts().to_vec()),
        }
    }
}

/// Client-facing text for an exhausted chain; names no endpoint or URL.
const fn generic_message(err: &ResolutionError) -> &'static str {
    match err {
        ResolutionError::UpstreamTimeout(_) => "Upstream provider timed out",
        ResolutionError::UpstreamNotFound(_) => "Not found at any upstream provider",
        ResolutionError::UpstreamRejected(_) => "Upstream provider rejected the request",
        ResolutionError::UpstreamServerError(_) => "Upstream provider failed",
        ResolutionError::Network(_) => "Upstream provider unreachable",
        _ => "Request failed",
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<Vec<EndpointAttempt>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.code,
            message: self.message,
            status: status.as_u16(),
            attempts: self.attempts,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epistream_core::UpstreamError;

    fn exhausted(last: UpstreamError) -> ResolutionError {
        let attempts = vec![EndpointAttempt {
            endpoint: last.endpoint().to_string(),
            requests: 1,
            kind: last.kind(),
            error: last.to_string(),
        }];
        ResolutionError::exhausted(last, attempts)
    }

    #[test]
    fn test_status_mapping() {
        let err = exhausted(UpstreamError::Status {
            endpoint: "primary".into(),
            status: 403,
        });
        assert_eq!(AppError::from_resolution(err, false).status, StatusCode::FORBIDDEN);

        let err = exhausted(UpstreamError::Status {
            endpoint: "primary".into(),
            status: 503,
        });
        let app = AppError::from_resolution(err, false);
        assert_eq!(app.status, StatusCode::BAD_GATEWAY);
        assert_eq!(app.code, "upstream_server_error");
        assert!(app.attempts.is_none());

        let err = ResolutionError::InvalidInput("episode id".into());
        assert_eq!(AppError::from_resolution(err, true).status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_attempts_only_in_debug_mode() {
        let err = exhausted(UpstreamError::Timeout {
            endpoint: "legacy".into(),
        });
        let app = AppError::from_resolution(err, true);
        assert_eq!(app.status, StatusCode::GATEWAY_TIMEOUT);
        assert!(app.message.contains("legacy"));
        assert_eq!(app.attempts.unwrap()[0].endpoint, "legacy");
    }

    #[test]
    fn test_messages_hide_endpoint_detail_outside_debug() {
        let causes = [
            UpstreamError::Network {
                endpoint: "primary".into(),
                message: "error sending request for url (http://internal-catalog.invalid/secret)".into(),
            },
            UpstreamError::Timeout {
                endpoint: "primary".into(),
            },
            UpstreamError::Empty {
                endpoint: "primary".into(),
            },
        ];
        for cause in causes {
            let app = AppError::from_resolution(exhausted(cause), false);
            assert!(!app.message.contains("primary"), "{}", app.message);
            assert!(!app.message.contains("internal-catalog"), "{}", app.message);
            assert!(app.attempts.is_none());
        }
    }
}
