//! Segmented HTTP download engine.
//!
//! A transfer runs through four stages:
//!
//! 1. The [`LinkResolver`] produces the URL to fetch.
//! 2. A `HEAD` probe discovers the content length and the final URL after
//!    redirects.
//! 3. A [`Ranger`] splits the content length into [`ByteRange`]s.
//! 4. Every range is fetched with a `Range: bytes=<lower>-<upper>` request and
//!    streamed to the [`OutputSink`] at its own offset.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rangeget::download::{
//!     DownloadConfig, Downloader, HunkRanger, NoopReporter, ReqwestTransport, StaticLink,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(
//!     Arc::new(ReqwestTransport::new()?),
//!     Arc::new(HunkRanger::default()),
//!     Arc::new(NoopReporter),
//!     DownloadConfig::default(),
//! )?;
//! let file = Arc::new(std::fs::File::create("product.tgz")?);
//! let link = StaticLink::new("https://example.com/product.tgz");
//! downloader.get(file, &link, std::io::stderr()).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod diagnostics;
pub mod engine;
mod error;
mod executor;
pub mod link;
pub mod progress;
pub mod range;
pub mod retry;
pub mod sink;
pub mod transport;

pub use client::ReqwestTransport;
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use engine::{DEFAULT_CONCURRENCY, DownloadConfig, DownloadReport, Downloader, EngineError};
pub use error::{BoxError, DownloadError, SegmentError};
pub use link::{LinkResolver, StaticLink};
pub use progress::{BarReporter, NoopReporter, ObservedSink, ProgressReporter};
pub use range::{
    ByteRange, DEFAULT_HUNKS, HunkRanger, MAX_HUNKS, RangeError, Ranger, SizedRanger,
};
pub use retry::{
    Classification, DEFAULT_DOWNLOAD_RETRIES, NetFault, RetryBudget, RetryDelay, RetryReason,
    classify,
};
pub use sink::OutputSink;
pub use transport::{BodyStream, Transport, TransportRequest, TransportResponse};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
