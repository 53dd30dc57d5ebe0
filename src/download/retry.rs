//! Retry budget, backoff and transient-fault classification.
//!
//! When a segment transfer fails, the error chain is classified into a
//! [`Classification`]:
//! - [`Classification::Retryable`] - unexpected EOF, connection reset, or an
//!   error that reports itself as temporary or timed out
//! - [`Classification::Fatal`] - everything else
//!
//! Retryable faults consume one unit of the segment's [`RetryBudget`] and the
//! segment restarts from its lower bound after a [`RetryDelay`].
//!
//! # Example
//!
//! ```
//! use std::io;
//! use rangeget::download::{Classification, RetryReason, classify};
//!
//! let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
//! assert_eq!(classify(&eof), Classification::Retryable(RetryReason::UnexpectedEof));
//!
//! let denied = io::Error::from(io::ErrorKind::PermissionDenied);
//! assert_eq!(classify(&denied), Classification::Fatal);
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::{BoxError, DownloadError};

/// Default retry budget when none is configured.
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Platform text for a reset connection, matched when a transport flattens
/// the OS error into a message.
const CONNECTION_RESET_TEXT: &str = "connection reset by peer";

/// Number of transient-fault recoveries left for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget(u32);

impl RetryBudget {
    /// Creates a budget allowing `retries` recoveries.
    #[must_use]
    pub fn new(retries: u32) -> Self {
        Self(retries)
    }

    /// Parses the string form of a budget.
    ///
    /// An absent or blank value yields `default`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Configuration`] if the value is not a
    /// non-negative integer.
    pub fn parse(raw: Option<&str>, default: u32) -> Result<Self, DownloadError> {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(Self(default));
        };

        raw.parse::<u32>()
            .map(Self)
            .map_err(|source| DownloadError::configuration(raw, source))
    }

    /// Remaining recoveries.
    #[must_use]
    pub fn remaining(self) -> u32 {
        self.0
    }

    /// Spends one recovery; returns false when the budget is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self(DEFAULT_DOWNLOAD_RETRIES)
    }
}

/// Backoff between a transient fault and the next attempt of a segment.
///
/// ```text
/// delay = min(base * 2^(retry - 1), max) + jitter(0..=max_jitter)
/// ```
///
/// With defaults, delays are approximately: 1s, 2s, 4s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelay {
    base: Duration,
    max: Duration,
    max_jitter: Duration,
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryDelay {
    /// Creates a backoff with custom settings.
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_jitter: Duration) -> Self {
        Self {
            base,
            max,
            max_jitter,
        }
    }

    /// Retries immediately.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before the `retry`-th re-attempt of a segment (1-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.base.as_millis() as f64;
        let exponent = retry.saturating_sub(1);
        let delay_ms = base_ms * 2_f64.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let capped_ms = delay_ms.min(self.max.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.jitter()
    }

    /// Random jitter between 0 and `max_jitter`.
    ///
    /// Keeps concurrently failing segments from retrying in lockstep.
    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Why a fault was judged recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The body ended before the announced length.
    UnexpectedEof,
    /// The peer reset the connection.
    ConnectionReset,
    /// The error reported itself as temporary.
    Temporary,
    /// The error reported itself as timed out.
    TimedOut,
}

/// Outcome of classifying a transfer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Recover by restarting the segment.
    Retryable(RetryReason),
    /// Abort the whole transfer.
    Fatal,
}

impl Classification {
    /// Returns true for [`Classification::Retryable`].
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// A transport error that reports whether it is temporary or a timeout.
///
/// Transports wrap their native errors in this type when they know a failure
/// is worth retrying; [`classify`] honors the flags wherever the fault sits in
/// the error chain.
#[derive(Debug)]
pub struct NetFault {
    temporary: bool,
    timeout: bool,
    source: BoxError,
}

impl NetFault {
    /// Wraps `source` with explicit flags.
    pub fn new(source: impl Into<BoxError>, temporary: bool, timeout: bool) -> Self {
        Self {
            temporary,
            timeout,
            source: source.into(),
        }
    }

    /// Wraps `source` as a temporary fault.
    pub fn temporary(source: impl Into<BoxError>) -> Self {
        Self::new(source, true, false)
    }

    /// Wraps `source` as a timeout.
    pub fn timeout(source: impl Into<BoxError>) -> Self {
        Self::new(source, false, true)
    }

    /// Whether the fault reports itself as temporary.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Whether the fault reports itself as timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.timeout
    }
}

impl fmt::Display for NetFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl StdError for NetFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

/// Classifies a transfer error by walking its whole source chain.
///
/// # Retryable
///
/// | Error | Reason |
/// |-------|--------|
/// | `io::ErrorKind::UnexpectedEof` | UnexpectedEof |
/// | `io::ErrorKind::ConnectionReset`, "connection reset by peer" text | ConnectionReset |
/// | `io::ErrorKind::TimedOut`, `reqwest` timeout, [`NetFault::timeout`] | TimedOut |
/// | `io::ErrorKind::{Interrupted, WouldBlock}`, [`NetFault::temporary`] | Temporary |
///
/// Everything else is fatal.
#[instrument(level = "debug", skip_all, fields(error = %error))]
pub fn classify(error: &(dyn StdError + 'static)) -> Classification {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(reason) = retry_reason(err) {
            debug!(?reason, "transient fault");
            return Classification::Retryable(reason);
        }
        current = next_in_chain(err);
    }
    Classification::Fatal
}

fn retry_reason(err: &(dyn StdError + 'static)) -> Option<RetryReason> {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        match io_err.kind() {
            io::ErrorKind::UnexpectedEof => return Some(RetryReason::UnexpectedEof),
            io::ErrorKind::ConnectionReset => return Some(RetryReason::ConnectionReset),
            io::ErrorKind::TimedOut => return Some(RetryReason::TimedOut),
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
                return Some(RetryReason::Temporary);
            }
            _ => {}
        }
    }

    if let Some(fault) = err.downcast_ref::<NetFault>() {
        if fault.is_timeout() {
            return Some(RetryReason::TimedOut);
        }
        if fault.is_temporary() {
            return Some(RetryReason::Temporary);
        }
    }

    if let Some(http_err) = err.downcast_ref::<reqwest::Error>()
        && http_err.is_timeout()
    {
        return Some(RetryReason::TimedOut);
    }

    if err
        .to_string()
        .to_ascii_lowercase()
        .contains(CONNECTION_RESET_TEXT)
    {
        return Some(RetryReason::ConnectionReset);
    }

    None
}

/// `io::Error::source` skips the custom payload, so descend into it directly.
fn next_in_chain<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    if let Some(io_err) = err.downcast_ref::<io::Error>()
        && let Some(inner) = io_err.get_ref()
    {
        return Some(inner as &(dyn StdError + 'static));
    }
    err.source()
}
