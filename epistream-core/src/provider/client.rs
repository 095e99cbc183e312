//! HTTP client for provider metadata endpoints

use std::time::Duration;

use reqwest::{header, Client};

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// Pooled client shared by every provider chain.
///
/// Built once from config and injected; never a process-wide static.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    max_body_bytes: usize,
}

impl UpstreamClient {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// `endpoint` is the configured endpoint name, carried into errors.
    pub async fn get_json(
        &self,
        endpoint: &str,
        url: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint, e))?;

        let response = check_response(endpoint, response)?;
        self.json_with_limit(endpoint, response).await
    }

    /// Read a response body with size limit and deserialize as JSON.
    ///
    /// Checks the `Content-Length` hint first, then enforces the limit on the
    /// actual body bytes before deserializing.
    async fn json_with_limit(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, UpstreamError> {
        let too_large = |size: u64| UpstreamError::InvalidBody {
            endpoint: endpoint.to_string(),
            message: format!("response too large ({size} bytes, max {})", self.max_body_bytes),
        };

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(too_large(length));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint, e))?;
        if bytes.len() > self.max_body_bytes {
            return Err(too_large(bytes.len() as u64));
        }

        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::InvalidBody {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

/// Check HTTP response status before processing body.
fn check_response(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(UpstreamError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(timeout_ms: u64, max_body_bytes: usize) -> UpstreamClient {
        UpstreamClient::from_config(&UpstreamConfig {
            timeout_ms,
            max_body_bytes,
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"a": 1})))
            .mount(&server)
            .await;

        let body = client(1_000, 1024)
            .get_json("primary", &format!("{}/ok", server.uri()))
            .await
            .unwrap();
        assert_eq!(body["a"], 1);
    }

    #[tokio::test]
    async fn test_status_errors_carry_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(1_000, 1024)
            .get_json("primary", &server.uri())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UpstreamError::Status {
                endpoint: "primary".to_string(),
                status: 503
            }
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = client(50, 1024)
            .get_json("slow", &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_oversized_and_invalid_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let c = client(1_000, 1024);
        let err = c.get_json("p", &format!("{}/big", server.uri())).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidBody { .. }));
        let err = c.get_json("p", &format!("{}/html", server.uri())).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidBody { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_network_errors_omit_the_request_url() {
        let err = client(1_000, 1024)
            .get_json("primary", "http://127.0.0.1:9/secret/episodes/abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Network { .. }));
        assert!(!err.to_string().contains("/secret/episodes"), "{err}");
    }
}
