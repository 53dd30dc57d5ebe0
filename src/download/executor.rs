//! Transfer of a single range, with per-segment recovery.
//!
//! Each attempt issues one ranged `GET` and streams the body into the sink at
//! `lower + bytes_written_so_far`. A transient fault debits the bytes the
//! attempt had credited, spends one retry and restarts the segment from its
//! lower bound; anything else fails the segment. A segment cancelled
//! mid-stream debits its credited bytes too.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};
use url::Url;

use super::diagnostics::Diagnostics;
use super::error::{BoxError, SegmentError};
use super::progress::ObservedSink;
use super::range::ByteRange;
use super::retry::{Classification, RetryBudget, RetryDelay, RetryReason, classify};
use super::transport::{Transport, TransportRequest};

/// Transfer-wide stop signal shared by every segment task.
#[derive(Debug, Default)]
pub(crate) struct Cancellation {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub(crate) fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub(crate) async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Everything a segment task needs, cloned once per range.
#[derive(Clone)]
pub(crate) struct SegmentContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) url: Url,
    pub(crate) sink: ObservedSink,
    pub(crate) delay: RetryDelay,
    pub(crate) cancelled: Arc<Cancellation>,
    pub(crate) diagnostics: Diagnostics,
}

/// How a segment ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentOutcome {
    /// All bytes the server sent for the range were written.
    Completed {
        /// Bytes written by the final attempt.
        bytes: u64,
        /// Retries spent.
        retries: u32,
    },
    /// Another segment failed first.
    Cancelled,
}

enum Attempt {
    Done(u64),
    Cancelled,
}

enum Failure {
    Fatal(SegmentError),
    Transient {
        written: u64,
        reason: RetryReason,
        source: BoxError,
    },
}

impl Failure {
    fn from_error(written: u64, source: BoxError, fatal: fn(BoxError) -> SegmentError) -> Self {
        match classify(&*source) {
            Classification::Retryable(reason) => Self::Transient {
                written,
                reason,
                source,
            },
            Classification::Fatal => Self::Fatal(fatal(source)),
        }
    }
}

/// Transfers `range` until it completes, fails fatally, exhausts `budget`, or
/// the transfer is cancelled.
///
/// # Errors
///
/// Returns the fatal [`SegmentError`], or [`SegmentError::MaxRetries`] carrying
/// the last transient fault.
#[instrument(skip(ctx, budget), fields(range = %range, retries = budget.remaining()))]
pub(crate) async fn run_segment(
    ctx: SegmentContext,
    range: ByteRange,
    mut budget: RetryBudget,
) -> Result<SegmentOutcome, SegmentError> {
    if range.is_empty() {
        debug!("empty range, nothing to fetch");
        return Ok(SegmentOutcome::Completed {
            bytes: 0,
            retries: 0,
        });
    }

    let mut retries = 0u32;
    loop {
        if ctx.cancelled.is_cancelled() {
            return Ok(SegmentOutcome::Cancelled);
        }

        match attempt(&ctx, range).await {
            Ok(Attempt::Done(bytes)) => {
                debug!(bytes, retries, "segment complete");
                return Ok(SegmentOutcome::Completed { bytes, retries });
            }
            Ok(Attempt::Cancelled) => return Ok(SegmentOutcome::Cancelled),
            Err(Failure::Fatal(error)) => return Err(error),
            Err(Failure::Transient {
                written,
                reason,
                source,
            }) => {
                if !budget.try_consume() {
                    warn!(?reason, error = %source, retries, "retries exhausted");
                    return Err(SegmentError::MaxRetries { retries, source });
                }
                ctx.sink.rollback(written);
                retries += 1;

                let delay = ctx.delay.delay_for(retries);
                warn!(
                    ?reason,
                    error = %source,
                    rolled_back = written,
                    retries_left = budget.remaining(),
                    delay_ms = delay.as_millis(),
                    "retrying segment"
                );
                ctx.diagnostics.line(format_args!(
                    "retrying {range}: {source} ({} retries left)",
                    budget.remaining()
                ));
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = ctx.cancelled.wait() => {
                        debug!("cancelled during backoff");
                        return Ok(SegmentOutcome::Cancelled);
                    }
                }
            }
        }
    }
}

/// One request for the whole range.
async fn attempt(ctx: &SegmentContext, range: ByteRange) -> Result<Attempt, Failure> {
    let request = TransportRequest::range(ctx.url.clone(), &range);
    let response = tokio::select! {
        response = ctx.transport.execute(request) => response,
        () = ctx.cancelled.wait() => return Ok(Attempt::Cancelled),
    };
    let response = response
        .map_err(|source| Failure::from_error(0, source, |source| SegmentError::Request { source }))?;

    if response.status != StatusCode::PARTIAL_CONTENT {
        return Err(Failure::Fatal(SegmentError::UnexpectedStatus {
            status: response.status.as_u16(),
        }));
    }

    let expected = range.len();
    let mut written = 0u64;
    let mut body = response.body;
    while written < expected {
        let next = tokio::select! {
            next = body.next() => next,
            () = ctx.cancelled.wait() => {
                ctx.sink.rollback(written);
                return Ok(Attempt::Cancelled);
            }
        };
        let Some(chunk) = next else {
            break;
        };
        let mut chunk =
            chunk.map_err(|source| Failure::from_error(written, source, SegmentError::copy))?;

        let remaining = expected - written;
        if chunk.len() as u64 > remaining {
            debug!(extra = chunk.len() as u64 - remaining, "server sent past range end");
            chunk.truncate(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        if chunk.is_empty() {
            continue;
        }

        let len = chunk.len() as u64;
        write_chunk(&ctx.sink, range.lower() + written, chunk)
            .await
            .map_err(Failure::Fatal)?;
        written += len;
    }

    if written < expected {
        debug!(written, expected, "body shorter than range");
    }
    Ok(Attempt::Done(written))
}

async fn write_chunk(sink: &ObservedSink, offset: u64, chunk: Bytes) -> Result<(), SegmentError> {
    let sink = sink.clone();
    tokio::task::spawn_blocking(move || sink.write_at(offset, &chunk))
        .await
        .map_err(SegmentError::copy)?
        .map_err(SegmentError::copy)
}
