use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use epistream_core::validation::ValidationError;
use serde_json::json;

/// Why a proxied request did not produce a relayed body.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Missing or empty url parameter")]
    MissingUrl,

    #[error("Forbidden target: {0}")]
    Forbidden(String),

    #[error("Content type '{0}' is not allowed")]
    ContentType(String),

    #[error("Upstream rejected the request with status {0}")]
    UpstreamRejected(StatusCode),

    #[error("Upstream server error: status {0}")]
    UpstreamServerError(StatusCode),

    #[error("Upstream timed out")]
    UpstreamTimeout,

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Manifest exceeds {0} bytes")]
    ManifestTooLarge(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) | Self::ContentType(_) => StatusCode::FORBIDDEN,
            Self::UpstreamRejected(status) => *status,
            Self::UpstreamServerError(_) | Self::Upstream(_) | Self::ManifestTooLarge(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingUrl => "invalid_input",
            Self::Forbidden(_) => "forbidden_target",
            Self::ContentType(_) => "forbidden_content_type",
            Self::UpstreamRejected(status) if status.as_u16() == 404 => "upstream_not_found",
            Self::UpstreamRejected(_) => "upstream_rejected",
            Self::UpstreamServerError(_) | Self::ManifestTooLarge(_) => "upstream_server_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::Upstream(_) => "upstream_network_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Terminal state recorded for this failure.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::MissingUrl | Self::Forbidden(_) | Self::ContentType(_) => "rejected",
            _ => "error_response",
        }
    }
}

impl From<ValidationError> for ProxyError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Forbidden(reason) => Self::Forbidden(reason),
            other => Self::Forbidden(other.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
