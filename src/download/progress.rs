//! Progress reporting for a running transfer.
//!
//! The engine announces the total size, starts the reporter, credits every
//! chunk written to the sink and debits the bytes of a segment that is about to
//! be retried. The displayed position therefore never over-counts retried
//! data.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::sink::OutputSink;

/// Receives progress updates from the engine.
///
/// Calls arrive from several segment tasks at once.
pub trait ProgressReporter: Send + Sync {
    /// Sets the total number of bytes expected.
    fn set_total(&self, total: u64);

    /// Marks the start of the transfer.
    fn kickoff(&self);

    /// Adjusts the position by `delta` bytes (negative on retry).
    fn add(&self, delta: i64);

    /// Marks the end of the transfer, successful or not.
    fn finish(&self);
}

/// A reporter that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn set_total(&self, _total: u64) {}

    fn kickoff(&self) {}

    fn add(&self, _delta: i64) {}

    fn finish(&self) {}
}

/// Terminal progress bar.
#[derive(Clone)]
pub struct BarReporter {
    bar: ProgressBar,
}

impl fmt::Debug for BarReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarReporter")
            .field("position", &self.bar.position())
            .field("total", &self.bar.length())
            .finish()
    }
}

impl BarReporter {
    /// Creates a bar drawn to stderr.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{bytes}/{total_bytes} [{wide_bar}] {bytes_per_sec} eta {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        Self { bar }
    }

    /// Creates a bar that tracks state without drawing.
    #[must_use]
    pub fn hidden() -> Self {
        let reporter = Self::new();
        reporter.bar.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Current position in bytes.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Total length in bytes, if set.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.bar.length()
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn kickoff(&self) {
        self.bar.reset_elapsed();
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn add(&self, delta: i64) {
        if delta >= 0 {
            self.bar.inc(delta.unsigned_abs());
        } else {
            self.bar.dec(delta.unsigned_abs().min(self.bar.position()));
        }
    }

    fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish();
    }
}

/// An [`OutputSink`] wrapper that credits every successful write to a
/// [`ProgressReporter`].
#[derive(Clone)]
pub struct ObservedSink {
    sink: Arc<dyn OutputSink>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ObservedSink {
    /// Wraps `sink` so writes are reported to `reporter`.
    pub fn new(sink: Arc<dyn OutputSink>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { sink, reporter }
    }

    /// Writes `buf` at `offset` and credits its length.
    ///
    /// # Errors
    ///
    /// Returns the sink's IO error; nothing is credited in that case.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.sink.write_at(offset, buf)?;
        self.reporter.add(to_delta(buf.len() as u64));
        Ok(())
    }

    /// Debits `bytes` previously credited by a segment that will be re-fetched.
    pub fn rollback(&self, bytes: u64) {
        if bytes > 0 {
            self.reporter.add(-to_delta(bytes));
        }
    }
}

impl fmt::Debug for ObservedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedSink").finish_non_exhaustive()
    }
}

fn to_delta(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}
