//! Input validation and proxy target checks
//!
//! Identifiers coming from clients are checked before any network call, and
//! proxy targets go through [`TargetGate`] before a connection is opened.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::Regex;
use url::{Host, Url};

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },

    #[error("Forbidden target: {0}")]
    Forbidden(String),
}

/// Validation result
pub type ValidationResult<T> = Result<T, ValidationError>;

static EPISODE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._~-]{0,127}$").expect("valid episode id regex")
});

static ANIME_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._~-]{0,127}$").expect("valid anime id regex")
});

static EPISODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,31}$").expect("valid episode regex"));

static LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("valid language regex")
});

static QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,16}$").expect("valid quality regex"));

static VOICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._-]{0,63}$").expect("valid voice regex"));

fn check(re: &Regex, field: &str, value: &str) -> ValidationResult<()> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::Field {
            field: field.to_string(),
            message: format!("'{}' is malformed", value.escape_debug()),
        })
    }
}

pub fn validate_episode_id(id: &str) -> ValidationResult<()> {
    check(&EPISODE_ID_RE, "episode id", id)
}

pub fn validate_anime_id(id: &str) -> ValidationResult<()> {
    check(&ANIME_ID_RE, "anime_id", id)
}

pub fn validate_episode(episode: &str) -> ValidationResult<()> {
    check(&EPISODE_RE, "episode", episode)
}

pub fn validate_language(language: &str) -> ValidationResult<()> {
    check(&LANGUAGE_RE, "language", language)
}

pub fn validate_quality(quality: &str) -> ValidationResult<()> {
    check(&QUALITY_RE, "quality", quality)
}

pub fn validate_voice(voice: &str) -> ValidationResult<()> {
    check(&VOICE_RE, "voice", voice)
}

/// Networks a proxied hostname must never resolve into.
static BLOCKED_NETWORKS: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "::/128",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
        "ff00::/8",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
});

/// Loopback, private, link-local, CGNAT, multicast and reserved ranges.
/// IPv4-mapped IPv6 addresses are checked as IPv4.
#[must_use]
pub fn is_private_ip(ip: &IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(*ip, IpAddr::V4),
        IpAddr::V4(_) => *ip,
    };
    BLOCKED_NETWORKS.iter().any(|net| net.contains(&ip))
}

/// Security gate applied to every proxy target and every redirect hop.
#[derive(Debug, Clone, Default)]
pub struct TargetGate {
    allowed_domains: Vec<String>,
    block_private_resolution: bool,
}

impl TargetGate {
    #[must_use]
    pub fn new(allowed_domains: &[String]) -> Self {
        Self {
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            block_private_resolution: false,
        }
    }

    #[must_use]
    pub const fn with_private_resolution_check(mut self, enabled: bool) -> Self {
        self.block_private_resolution = enabled;
        self
    }

    #[must_use]
    pub const fn checks_resolution(&self) -> bool {
        self.block_private_resolution
    }

    /// Parse a raw target and run the static checks.
    pub fn parse(&self, raw: &str) -> ValidationResult<Url> {
        let url = Url::parse(raw)
            .map_err(|e| ValidationError::Forbidden(format!("unparseable URL: {e}")))?;
        self.check(&url)?;
        Ok(url)
    }

    /// Static checks, in order: scheme, literal IP host, domain whitelist.
    pub fn check(&self, url: &Url) -> ValidationResult<()> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::Forbidden(format!(
                "scheme '{}' is not allowed",
                url.scheme()
            )));
        }

        let host = match url.host() {
            Some(Host::Domain(host)) => host.trim_end_matches('.').to_ascii_lowercase(),
            Some(Host::Ipv4(_) | Host::Ipv6(_)) => {
                return Err(ValidationError::Forbidden(
                    "IP address hosts are not allowed".to_string(),
                ))
            }
            None => return Err(ValidationError::Forbidden("URL has no host".to_string())),
        };

        if !self.allowed_domains.is_empty() && !self.is_allowed(&host) {
            return Err(ValidationError::Forbidden(format!(
                "host '{host}' is not in the allowed domains"
            )));
        }

        Ok(())
    }

    fn is_allowed(&self, host: &str) -> bool {
        self.allowed_domains.iter().any(|allowed| {
            host == allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Resolve the host and refuse private destinations. No-op unless the
    /// resolution check is enabled.
    pub async fn check_resolved(&self, url: &Url) -> ValidationResult<()> {
        if !self.block_private_resolution {
            return Ok(());
        }

        let host = url
            .host_str()
            .ok_or_else(|| ValidationError::Forbidden("URL has no host".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(443);

        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ValidationError::Forbidden(format!("DNS resolution failed for {host}: {e}")))?;

        for addr in addrs {
            if is_private_ip(&addr.ip()) {
                tracing::warn!(host, ip = %addr.ip(), "Proxy target resolves to a private address");
                return Err(ValidationError::Forbidden(format!(
                    "host '{host}' resolves to a private address"
                )));
            }
        }

        Ok(())
    }
}
