//! Error types for the download module.
//!
//! Every fatal path carries a stage-specific prefix so operators can tell a
//! probe failure from a planning, sink or transfer failure. The originating
//! cause is always kept as the error source.

use std::io;
use std::num::ParseIntError;

use thiserror::Error;

use super::range::{ByteRange, RangeError};

/// Boxed error used at capability boundaries (transport, link resolution).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`Downloader::get`](super::Downloader::get).
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The configured retry budget is not a non-negative integer.
    #[error("could not convert download retries to number: {source}")]
    Configuration {
        /// The rejected value.
        value: String,
        /// The parse failure.
        #[source]
        source: ParseIntError,
    },

    /// The link resolver could not produce a URL.
    #[error("failed to resolve download link: {source}")]
    Resolution {
        /// The resolver failure.
        #[source]
        source: BoxError,
    },

    /// The probe request could not be built (malformed URL).
    #[error("failed to construct probe request: {source}")]
    ProbeConstruction {
        /// The link that failed to parse.
        url: String,
        /// The URL parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The transport failed while executing the probe.
    #[error("failed to make probe request: {source}")]
    ProbeRequest {
        /// The probed URL.
        url: String,
        /// The transport failure.
        #[source]
        source: BoxError,
    },

    /// The probe completed with a non-success status.
    #[error("probe returned unexpected status code: {status}")]
    ProbeStatus {
        /// The probed URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The range planner rejected the content length.
    #[error("failed to construct range: {source}")]
    Planning {
        /// The planner failure.
        #[source]
        source: RangeError,
    },

    /// The output sink could not be inspected or sized.
    #[error("failed to {action}: {source}")]
    Sink {
        /// What was being done to the sink.
        action: &'static str,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A segment transfer failed fatally.
    #[error("failed during retryable request: {source}")]
    Transfer {
        /// The segment that failed.
        range: ByteRange,
        /// The segment failure.
        #[source]
        source: SegmentError,
    },

    /// A segment task panicked or was aborted.
    #[error("segment task failed: {source}")]
    TaskFailed {
        /// The join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl DownloadError {
    /// Creates a configuration error for an unparseable retry budget.
    pub fn configuration(value: impl Into<String>, source: ParseIntError) -> Self {
        Self::Configuration {
            value: value.into(),
            source,
        }
    }

    /// Creates a link resolution error.
    pub fn resolution(source: impl Into<BoxError>) -> Self {
        Self::Resolution {
            source: source.into(),
        }
    }

    /// Creates an output sink error.
    pub fn sink(action: &'static str, source: io::Error) -> Self {
        Self::Sink { action, source }
    }

    /// Short label of the stage that failed, for logs and exit messages.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Resolution { .. } => "resolution",
            Self::ProbeConstruction { .. } | Self::ProbeRequest { .. } | Self::ProbeStatus { .. } => {
                "probe"
            }
            Self::Planning { .. } => "plan",
            Self::Sink { .. } => "sink",
            Self::Transfer {
                source: SegmentError::Copy { .. },
                ..
            } => "write",
            Self::Transfer { .. } | Self::TaskFailed { .. } => "transfer",
        }
    }

    /// Returns true when a segment ran out of retries.
    #[must_use]
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Transfer {
                source: SegmentError::MaxRetries { .. },
                ..
            }
        )
    }
}

/// Fatal outcome of a single segment transfer.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The transport returned a non-retryable error.
    #[error("download request failed: {source}")]
    Request {
        /// The transport failure.
        #[source]
        source: BoxError,
    },

    /// The server did not answer with 206 Partial Content.
    #[error("during GET unexpected status code was returned: {status}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// Streaming the body into the sink failed.
    #[error("failed to write file during copy: {source}")]
    Copy {
        /// The read or write failure.
        #[source]
        source: BoxError,
    },

    /// A transient fault occurred with no retries left.
    #[error("maximum retries reached: {source}")]
    MaxRetries {
        /// Retries that were spent on this segment before giving up.
        retries: u32,
        /// The last transient fault.
        #[source]
        source: BoxError,
    },
}

impl SegmentError {
    /// Creates a copy error from any read or write failure.
    pub fn copy(source: impl Into<BoxError>) -> Self {
        Self::Copy {
            source: source.into(),
        }
    }
}
