//! Link resolution: where the bytes come from.

use async_trait::async_trait;

use super::error::BoxError;

/// Produces the URL of the resource to download.
///
/// Resolution may itself involve network calls (signed URLs, registry
/// lookups). It is invoked once per transfer; segment retries reuse the URL
/// discovered by the probe.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Returns the download URL.
    ///
    /// # Errors
    ///
    /// Returns any failure encountered while resolving.
    async fn resolve(&self) -> Result<String, BoxError>;
}

/// A resolver that always returns the same URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLink {
    url: String,
}

impl StaticLink {
    /// Creates a resolver for a fixed URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl LinkResolver for StaticLink {
    async fn resolve(&self) -> Result<String, BoxError> {
        Ok(self.url.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_link_resolves_to_its_url() {
        let link = StaticLink::new("https://example.com/product.tgz");
        assert_eq!(link.resolve().await.unwrap(), "https://example.com/product.tgz");
    }
}
