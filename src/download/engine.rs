//! Download orchestrator: probe, plan, and concurrent segment transfer.
//!
//! The [`Downloader`] resolves the link, probes the resource with `HEAD`,
//! asks the [`Ranger`] for a plan, trims a stale sink and then transfers every
//! range in its own task. A semaphore bounds how many segments are in flight.
//! The first fatal segment failure stops dispatch, cancels in-flight segments
//! and is returned once they have wound down.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::MAX_CONCURRENCY;
use super::diagnostics::Diagnostics;
use super::error::{DownloadError, SegmentError};
use super::executor::{Cancellation, SegmentContext, SegmentOutcome, run_segment};
use super::link::LinkResolver;
use super::progress::{ObservedSink, ProgressReporter};
use super::range::{ByteRange, RangeError, Ranger};
use super::retry::{DEFAULT_DOWNLOAD_RETRIES, RetryBudget, RetryDelay};
use super::sink::OutputSink;
use super::transport::{Transport, TransportRequest};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Default number of segments in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for building a [`Downloader`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Settings for one [`Downloader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    retries: Option<String>,
    default_retries: u32,
    concurrency: usize,
    retry_delay: RetryDelay,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: None,
            default_retries: DEFAULT_DOWNLOAD_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            retry_delay: RetryDelay::default(),
        }
    }
}

impl DownloadConfig {
    /// Sets the retry budget in its string form.
    ///
    /// The value is parsed when a transfer starts; a blank value falls back to
    /// [`default_retries`](Self::with_default_retries).
    #[must_use]
    pub fn with_retries(mut self, retries: impl Into<String>) -> Self {
        self.retries = Some(retries.into());
        self
    }

    /// Sets the budget used when no retry value is configured.
    #[must_use]
    pub fn with_default_retries(mut self, default_retries: u32) -> Self {
        self.default_retries = default_retries;
        self
    }

    /// Sets how many segments may be in flight at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the backoff between a transient fault and the next attempt.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: RetryDelay) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// The configured retry value, if any.
    #[must_use]
    pub fn retries(&self) -> Option<&str> {
        self.retries.as_deref()
    }

    /// Segments in flight at once.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// URL the segments were fetched from (after redirects).
    pub url: String,
    /// Resource length reported by the probe.
    pub content_length: u64,
    /// Number of ranges in the plan.
    pub ranges: usize,
    /// Retries spent across all segments.
    pub retries: u32,
}

/// Range-partitioned downloader.
///
/// Capabilities are injected so the same engine runs against real HTTP, a
/// scripted transport in tests, or any other source that speaks ranges.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    ranger: Arc<dyn Ranger>,
    progress: Arc<dyn ProgressReporter>,
    config: DownloadConfig,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Downloader {
    /// Creates a downloader.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the configured
    /// concurrency is outside `1..=100`.
    pub fn new(
        transport: Arc<dyn Transport>,
        ranger: Arc<dyn Ranger>,
        progress: Arc<dyn ProgressReporter>,
        config: DownloadConfig,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }

        debug!(
            concurrency = config.concurrency,
            retries = ?config.retries,
            default_retries = config.default_retries,
            "creating downloader"
        );

        Ok(Self {
            transport,
            ranger,
            progress,
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads the resource named by `link` into `sink`.
    ///
    /// Retry notices and start/completion lines are written to `diagnostics`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`DownloadError`]; see [`fetch`](Self::fetch).
    pub async fn get<S, W>(
        &self,
        sink: Arc<S>,
        link: &dyn LinkResolver,
        diagnostics: W,
    ) -> Result<(), DownloadError>
    where
        S: OutputSink + 'static,
        W: Write + Send + 'static,
    {
        self.fetch(sink, link, diagnostics).await.map(|_| ())
    }

    /// Downloads the resource and returns a summary of the transfer.
    ///
    /// # Errors
    ///
    /// Returns, in stage order:
    /// - [`DownloadError::Configuration`] if the retry value is not a number
    ///   (before any network call)
    /// - [`DownloadError::Resolution`] if the link cannot be resolved
    /// - [`DownloadError::ProbeConstruction`], [`DownloadError::ProbeRequest`] or
    ///   [`DownloadError::ProbeStatus`] if the `HEAD` probe fails
    /// - [`DownloadError::Planning`] if the ranger rejects the length
    /// - [`DownloadError::Sink`] if the sink cannot be inspected or sized
    /// - [`DownloadError::Transfer`] or [`DownloadError::TaskFailed`] for the
    ///   first failing segment
    #[instrument(skip(self, sink, link, diagnostics))]
    pub async fn fetch<S, W>(
        &self,
        sink: Arc<S>,
        link: &dyn LinkResolver,
        diagnostics: W,
    ) -> Result<DownloadReport, DownloadError>
    where
        S: OutputSink + 'static,
        W: Write + Send + 'static,
    {
        let budget = RetryBudget::parse(self.config.retries(), self.config.default_retries)?;
        let diagnostics = Diagnostics::new(diagnostics);

        let link = link.resolve().await.map_err(DownloadError::resolution)?;
        let (url, content_length) = self.probe(&link).await?;

        let ranges = self
            .ranger
            .build_ranges(content_length)
            .map_err(|source| DownloadError::Planning { source })?;
        debug!(ranges = ranges.len(), "range plan built");

        // Positional writes grow the sink; only leftover bytes past the end are cut.
        let existing = sink
            .size()
            .map_err(|e| DownloadError::sink("read information from output file", e))?;
        if existing > content_length {
            sink.set_size(content_length)
                .map_err(|e| DownloadError::sink("size output file", e))?;
        }

        diagnostics.line(format_args!(
            "downloading {content_length} bytes from {url} in {} ranges",
            ranges.len()
        ));

        self.progress.set_total(content_length);
        self.progress.kickoff();
        let observed = ObservedSink::new(Arc::clone(&sink) as Arc<dyn OutputSink>, Arc::clone(&self.progress));
        let outcome = self
            .transfer(&url, observed, &ranges, budget, &diagnostics)
            .await;
        if let Ok(tally) = &outcome
            && tally.end < content_length
        {
            warn!(
                expected = content_length,
                received = tally.end,
                "server sent fewer bytes than the probe reported"
            );
            self.progress.set_total(tally.end);
        }
        self.progress.finish();

        let tally = outcome?;
        let written = sink
            .size()
            .map_err(|e| DownloadError::sink("read information from output file", e))?;
        if written > tally.end {
            sink.set_size(tally.end)
                .map_err(|e| DownloadError::sink("size output file", e))?;
        }

        info!(
            url = %url,
            content_length,
            bytes = tally.end,
            ranges = ranges.len(),
            retries = tally.retries,
            "download complete"
        );
        diagnostics.line(format_args!("downloaded {} bytes", tally.end));

        Ok(DownloadReport {
            url: url.to_string(),
            content_length,
            ranges: ranges.len(),
            retries: tally.retries,
        })
    }

    /// Issues the `HEAD` probe; returns the final URL and the content length.
    async fn probe(&self, link: &str) -> Result<(Url, u64), DownloadError> {
        let url = Url::parse(link).map_err(|source| DownloadError::ProbeConstruction {
            url: link.to_string(),
            source,
        })?;

        let response = self
            .transport
            .execute(TransportRequest::head(url))
            .await
            .map_err(|source| DownloadError::ProbeRequest {
                url: link.to_string(),
                source,
            })?;

        if !response.status.is_success() {
            return Err(DownloadError::ProbeStatus {
                url: link.to_string(),
                status: response.status.as_u16(),
            });
        }

        let content_length = response.content_length.ok_or(DownloadError::Planning {
            source: RangeError::UnknownLength,
        })?;
        info!(
            url = %response.url,
            content_length,
            redirected = response.url.as_str() != link,
            "probe complete"
        );
        Ok((response.url, content_length))
    }

    /// Runs every range.
    async fn transfer(
        &self,
        url: &Url,
        sink: ObservedSink,
        ranges: &[ByteRange],
        budget: RetryBudget,
        diagnostics: &Diagnostics,
    ) -> Result<Tally, DownloadError> {
        let ctx = SegmentContext {
            transport: Arc::clone(&self.transport),
            url: url.clone(),
            sink,
            delay: self.config.retry_delay,
            cancelled: Arc::new(Cancellation::default()),
            diagnostics: diagnostics.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut failure: Option<DownloadError> = None;
        let mut tally = Tally::default();

        for &range in ranges {
            while let Some(joined) = tasks.try_join_next() {
                record(joined, &ctx, &mut failure, &mut tally);
            }
            if ctx.cancelled.is_cancelled() {
                break;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if ctx.cancelled.is_cancelled() {
                break;
            }

            let segment = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let cancelled = Arc::clone(&segment.cancelled);
                let result = run_segment(segment, range, budget).await;
                if result.is_err() {
                    cancelled.cancel();
                }
                (range, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            record(joined, &ctx, &mut failure, &mut tally);
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(tally),
        }
    }
}

/// What the completed segments added up to.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    retries: u32,
    /// One past the highest offset written.
    end: u64,
}

type Joined = Result<(ByteRange, Result<SegmentOutcome, SegmentError>), tokio::task::JoinError>;

/// Folds one finished segment into the transfer state; the first failure wins.
fn record(
    joined: Joined,
    ctx: &SegmentContext,
    failure: &mut Option<DownloadError>,
    tally: &mut Tally,
) {
    let error = match joined {
        Ok((range, Ok(SegmentOutcome::Completed { bytes, retries }))) => {
            tally.retries = tally.retries.saturating_add(retries);
            if bytes > 0 {
                tally.end = tally.end.max(range.lower() + bytes);
            }
            return;
        }
        Ok((range, Ok(SegmentOutcome::Cancelled))) => {
            debug!(range = %range, "segment cancelled");
            return;
        }
        Ok((range, Err(source))) => DownloadError::Transfer { range, source },
        Err(source) => DownloadError::TaskFailed { source },
    };

    ctx.cancelled.cancel();
    if failure.is_none() {
        warn!(error = %error, stage = error.stage(), "segment failed, cancelling transfer");
        *failure = Some(error);
    } else {
        debug!(error = %error, "additional segment failure");
    }
}
