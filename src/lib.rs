//! Range-partitioned HTTP downloader
//!
//! This library fetches a single remote resource by splitting it into byte
//! ranges, transferring each range with its own HTTP request, and writing every
//! range at its offset in an output sink. Transient faults (unexpected EOF,
//! connection resets, timeouts) are recovered per segment without restarting
//! the whole transfer.
//!
//! # Architecture
//!
//! - [`download::range`] - Range planning strategies ([`Ranger`])
//! - [`download::retry`] - Retry budget, backoff and fault classification
//! - [`download::transport`] - The injected HTTP capability ([`Transport`])
//! - [`download::progress`] - Progress reporting ([`ProgressReporter`])
//! - [`download::engine`] - The orchestrator ([`Downloader`])

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
mod user_agent;

// Re-export commonly used types
pub use download::{
    BarReporter, BoxError, ByteRange, CONNECT_TIMEOUT_SECS, Classification, DEFAULT_CONCURRENCY,
    DEFAULT_DOWNLOAD_RETRIES, DEFAULT_HUNKS, DownloadConfig, DownloadError, DownloadReport,
    Downloader, EngineError, HunkRanger, LinkResolver, MAX_HUNKS, NetFault, NoopReporter,
    ObservedSink, OutputSink, ProgressReporter, READ_TIMEOUT_SECS, RangeError, Ranger,
    ReqwestTransport, RetryBudget, RetryDelay, RetryReason, SegmentError, SizedRanger, StaticLink,
    Transport, TransportRequest, TransportResponse, classify,
};
