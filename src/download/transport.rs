//! The HTTP capability the engine runs on.
//!
//! The engine never talks to the network directly; it hands a
//! [`TransportRequest`] to an injected [`Transport`] and consumes the
//! [`TransportResponse`]. [`ReqwestTransport`](super::ReqwestTransport) is the
//! production implementation; tests script their own.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, stream};
use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use reqwest::{Method, StatusCode};
use url::Url;

use super::error::BoxError;
use super::range::ByteRange;

/// A boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// One request issued by the engine.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method (`HEAD` for the probe, `GET` for segments).
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Extra headers.
    pub headers: HeaderMap,
}

impl TransportRequest {
    /// Builds the metadata probe.
    #[must_use]
    pub fn head(url: Url) -> Self {
        Self {
            method: Method::HEAD,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Builds the `GET` for one segment, with its `Range` header.
    ///
    /// An empty range gets no header.
    #[must_use]
    pub fn range(url: Url, range: &ByteRange) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(value) = range
            .header_value()
            .and_then(|value| HeaderValue::from_str(&value).ok())
        {
            headers.insert(RANGE, value);
        }
        Self {
            method: Method::GET,
            url,
            headers,
        }
    }

    /// The `Range` header, if any.
    #[must_use]
    pub fn range_header(&self) -> Option<&str> {
        self.headers.get(RANGE).and_then(|v| v.to_str().ok())
    }
}

/// A response as seen by the engine.
pub struct TransportResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Declared body length, when the server sent one.
    pub content_length: Option<u64>,
    /// Final URL after redirects.
    pub url: Url,
    /// Response body.
    pub body: BodyStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    /// Creates a response with no headers and an empty body.
    #[must_use]
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content_length: None,
            url,
            body: Box::pin(stream::empty()),
        }
    }

    /// Sets the declared content length.
    #[must_use]
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    /// Replaces the body stream.
    #[must_use]
    pub fn with_body(mut self, body: BodyStream) -> Self {
        self.body = body;
        self
    }

    /// Replaces the body with a single chunk.
    #[must_use]
    pub fn with_body_bytes(self, body: impl Into<Bytes>) -> Self {
        let chunk: Result<Bytes, BoxError> = Ok(body.into());
        self.with_body(Box::pin(stream::iter([chunk])))
    }
}

/// Executes HTTP requests for the engine.
///
/// Implementations follow redirects and report the final URL in
/// [`TransportResponse::url`]. Errors should carry enough of their source
/// chain for [`classify`](super::classify) to recognise transient faults.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one request.
    ///
    /// # Errors
    ///
    /// Returns the transport failure (DNS, connect, TLS, timeout, ...).
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, BoxError>;
}
