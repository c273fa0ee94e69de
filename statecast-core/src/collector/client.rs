//! HTTP client for the state collector
//!
//! One endpoint: `POST {server_url}{state_path}` with a JSON
//! [`StatePayload`]. Every HTTP response, success or not, is handed back to
//! the caller for interpretation; only transport failures are errors.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;

use crate::config::ReporterConfig;
use crate::error::{Error, Result};

use super::payload::StatePayload;

/// Raw collector answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorResponse {
    pub status: StatusCode,
    /// Response body, only used for logging
    pub body: String,
}

/// HTTP client for the collector state endpoint
pub struct CollectorClient {
    http_client: reqwest::Client,
    state_url: String,
}

impl CollectorClient {
    /// Create a new collector client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &ReporterConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .base_url()
            .ok_or_else(|| Error::Config("reporter.server_url is required".to_string()))?;
        let state_url = format!("{}{}", base_url, config.state_path);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("statecast/", env!("CARGO_PKG_VERSION"))),
        );

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            state_url,
        })
    }

    /// Full URL of the state endpoint
    pub fn state_url(&self) -> &str {
        &self.state_url
    }

    /// Post one state payload
    ///
    /// A request that exceeds the configured timeout fails with
    /// [`Error::Transport`], like any other connection problem.
    pub async fn send_state(&self, payload: &StatePayload<'_>) -> Result<CollectorResponse> {
        let response = self
            .http_client
            .post(&self.state_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;

        Ok(CollectorResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_valid_config() {
        assert!(CollectorClient::new(&ReporterConfig::default()).is_err());
    }

    #[test]
    fn test_state_url() {
        let config = ReporterConfig {
            state_path: "/v1/presence".to_string(),
            ..ReporterConfig::for_server("https://presence.example.com/")
        };
        let client = CollectorClient::new(&config).unwrap();
        assert_eq!(client.state_url(), "https://presence.example.com/v1/presence");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let config = ReporterConfig {
            request_timeout_ms: 500,
            ..ReporterConfig::for_server("http://127.0.0.1:9")
        };
        let client = CollectorClient::new(&config).unwrap();
        let state = crate::state::StateSnapshot::from_pairs([("a", "b")]);
        let payload = StatePayload::new("tok", 1, &state);

        assert!(matches!(
            client.send_state(&payload).await,
            Err(Error::Transport(_))
        ));
    }
}
