use serde::Serialize;
use thiserror::Error;

/// Concrete cause of a single failed upstream call.
///
/// Clone is required so that concurrent waiters on a single-flight group can
/// each receive the leader's failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("network error contacting {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} returned an unusable body: {message}")]
    InvalidBody { endpoint: String, message: String },

    #[error("{endpoint} returned no usable entries")]
    Empty { endpoint: String },
}

/// Classification used for HTTP mapping and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NotFound,
    Rejected,
    ServerError,
    Network,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::ServerError => "server_error",
            Self::Network => "network",
        }
    }
}

impl UpstreamError {
    /// Timeouts, network failures, 5xx and 429 are worth retrying against the
    /// same endpoint. Everything else moves straight on to the next endpoint.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidBody { .. } | Self::Empty { .. } => false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Network { .. } => FailureKind::Network,
            Self::Status { status, .. } => match *status {
                404 | 410 => FailureKind::NotFound,
                400..=499 => FailureKind::Rejected,
                _ => FailureKind::ServerError,
            },
            Self::InvalidBody { .. } => FailureKind::ServerError,
            Self::Empty { .. } => FailureKind::NotFound,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Timeout { endpoint }
            | Self::Network { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::InvalidBody { endpoint, .. }
            | Self::Empty { endpoint } => endpoint,
        }
    }

    /// Build from a transport-level reqwest failure.
    ///
    /// The request URL is stripped so provider locations never end up in
    /// messages that may reach a client.
    pub fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        let endpoint = endpoint.to_string();
        if err.is_timeout() {
            Self::Timeout { endpoint }
        } else if let Some(status) = err.status() {
            Self::Status {
                endpoint,
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::InvalidBody {
                endpoint,
                message: err.without_url().to_string(),
            }
        } else {
            Self::Network {
                endpoint,
                message: err.without_url().to_string(),
            }
        }
    }
}

/// Outcome of one endpoint in a provider chain, kept for debug responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointAttempt {
    pub endpoint: String,
    /// Number of HTTP requests issued (1 + retries).
    pub requests: u32,
    pub kind: FailureKind,
    pub error: String,
}

/// Every endpoint of a chain failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub last: UpstreamError,
    pub attempts: Vec<EndpointAttempt>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream timed out: {}", .0.last)]
    UpstreamTimeout(Exhausted),

    #[error("Upstream not found: {}", .0.last)]
    UpstreamNotFound(Exhausted),

    #[error("Upstream rejected request: {}", .0.last)]
    UpstreamRejected(Exhausted),

    #[error("Upstream server error: {}", .0.last)]
    UpstreamServerError(Exhausted),

    #[error("Upstream network error: {}", .0.last)]
    Network(Exhausted),

    #[error("No providers configured for {0}")]
    NotConfigured(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolutionError {
    /// Classify an exhausted chain by its last concrete cause.
    #[must_use]
    pub fn exhausted(last: UpstreamError, attempts: Vec<EndpointAttempt>) -> Self {
        let kind = last.kind();
        let exhausted = Exhausted { last, attempts };
        match kind {
            FailureKind::Timeout => Self::UpstreamTimeout(exhausted),
            FailureKind::NotFound => Self::UpstreamNotFound(exhausted),
            FailureKind::Rejected => Self::UpstreamRejected(exhausted),
            FailureKind::ServerError => Self::UpstreamServerError(exhausted),
            FailureKind::Network => Self::Network(exhausted),
        }
    }

    /// Machine-readable error code exposed to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::UpstreamNotFound(_) => "upstream_not_found",
            Self::UpstreamRejected(_) => "upstream_rejected",
            Self::UpstreamServerError(_) => "upstream_server_error",
            Self::Network(_) => "upstream_network_error",
            Self::NotConfigured(_) => "not_configured",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub const fn exhaustion(&self) -> Option<&Exhausted> {
        match self {
            Self::UpstreamTimeout(e)
            | Self::UpstreamNotFound(e)
            | Self::UpstreamRejected(e)
            | Self::UpstreamServerError(e)
            | Self::Network(e) => Some(e),
            Self::InvalidInput(_) | Self::NotConfigured(_) | Self::Internal(_) => None,
        }
    }

    #[must_use]
    pub fn last_cause(&self) -> Option<&UpstreamError> {
        self.exhaustion().map(|e| &e.last)
    }

    #[must_use]
    pub fn attempts(&self) -> &[EndpointAttempt] {
        self.exhaustion().map_or(&[], |e| e.attempts.as_slice())
    }

    /// Upstream 4xx status to pass through, if the last cause carried one.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self.last_cause() {
            Some(UpstreamError::Status { status, .. }) if (400..500).contains(status) => {
                Some(*status)
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache TTL must be greater than zero")]
    InvalidTtl,

    #[error("Cache operation timed out")]
    Timeout,
}
