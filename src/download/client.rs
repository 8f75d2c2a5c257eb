//! HTTP client wrapper shared by the resolver and the segment fetchers.
//!
//! One [`HttpClient`] is built per engine and cloned into every fetcher task,
//! so all segments of a download share the same connection pool.

use reqwest::Client;
use reqwest::Response;
use reqwest::header::RANGE;
use tracing::{debug, instrument};

use super::config::EngineConfig;
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client with the engine's timeouts and User-Agent applied.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client using the timeouts from `config`.
    ///
    /// The client never asks for compressed transfer encodings, so range
    /// offsets always address the raw entity bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend or system
    /// configuration cannot be initialized.
    pub fn new(config: &EngineConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Sends a plain `GET` and returns the response without reading the body.
    ///
    /// Callers only inspect headers; dropping the response closes the stream.
    ///
    /// # Errors
    ///
    /// Returns a network error if the request fails, or
    /// [`DownloadError::HttpStatus`] for non-success responses.
    #[instrument(level = "debug", skip(self))]
    pub async fn probe(&self, url: &str) -> Result<Response, DownloadError> {
        self.send(url, None).await
    }

    /// Sends a `GET`, optionally with a `Range` header value such as `bytes=0-99`.
    ///
    /// # Errors
    ///
    /// Same as [`probe`](Self::probe).
    #[instrument(level = "debug", skip(self))]
    pub async fn get_range(
        &self,
        url: &str,
        range: Option<&str>,
    ) -> Result<Response, DownloadError> {
        self.send(url, range).await
    }

    async fn send(&self, url: &str, range: Option<&str>) -> Result<Response, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_returns_headers() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"abc\"")
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&EngineConfig::default()).unwrap();
        let response = client
            .probe(&format!("{}/file.bin", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(response.headers()["etag"], "\"abc\"");
    }

    #[tokio::test]
    async fn test_probe_404_is_http_status_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&EngineConfig::default()).unwrap();
        let result = client
            .probe(&format!("{}/missing.bin", mock_server.uri()))
            .await;

        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_range_sends_range_header() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header("range", "bytes=10-19"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8; 10]))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&EngineConfig::default()).unwrap();
        let response = client
            .get_range(&format!("{}/file.bin", mock_server.uri()), Some("bytes=10-19"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 206);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = HttpClient::new(&EngineConfig::default()).unwrap();
        // Port 1 is reserved and never listening in test environments.
        let result = client.probe("http://127.0.0.1:1/file.bin").await;
        let error = result.unwrap_err();
        assert_eq!(error.kind(), super::super::error::ErrorKind::NetworkError);
    }
}
