//! Production [`Transport`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_LENGTH, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::BoxError;
use super::transport::{Transport, TransportRequest, TransportResponse};
use crate::user_agent;

/// HTTP transport using a pooled `reqwest` client.
///
/// Created once per process and shared between segments so connections are
/// reused. Bodies are requested with `Accept-Encoding: identity` so byte
/// offsets in `Range` headers refer to the stored representation.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes between body chunks
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    #[instrument(level = "debug")]
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .gzip(false)
            .default_headers(headers)
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, BoxError> {
        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .send()
            .await?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let content_length = parse_content_length(&headers);
        debug!(status = status.as_u16(), ?content_length, final_url = %url, "response received");

        let body = response.bytes_stream().map_err(|e| -> BoxError { Box::new(e) });
        Ok(TransportResponse {
            status,
            headers,
            content_length,
            url,
            body: Box::pin(body),
        })
    }
}

/// `Response::content_length` reports the body actually sent, which is zero for
/// `HEAD`; the header carries the resource length.
fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_with_defaults() {
        assert!(ReqwestTransport::new().is_ok());
    }

    #[test]
    fn test_parse_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_content_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(parse_content_length(&headers), Some(1234));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(parse_content_length(&headers), None);
    }
}
