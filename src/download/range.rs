//! Range planning: splitting a content length into byte ranges.
//!
//! A plan is an ordered list of [`ByteRange`]s that covers `[0, len - 1]`
//! exactly once with no overlap. The partitioning policy is pluggable through
//! the [`Ranger`] trait; [`HunkRanger`] (fixed range count) is the default and
//! [`SizedRanger`] (fixed range size) is provided as an alternative.

use thiserror::Error;

/// Default number of ranges a transfer is split into.
pub const DEFAULT_HUNKS: u64 = 10;

/// Largest range count [`HunkRanger`] accepts.
pub const MAX_HUNKS: u64 = 10_000;

/// Errors produced while planning ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The planner was configured to produce zero ranges.
    #[error("range count must be greater than zero")]
    ZeroHunks,

    /// The planner was configured to produce more ranges than allowed.
    #[error("range count {hunks} exceeds the maximum of {max}")]
    TooManyHunks {
        /// The configured range count.
        hunks: u64,
        /// The largest accepted range count.
        max: u64,
    },

    /// The planner was configured with a zero range size.
    #[error("range size must be greater than zero")]
    ZeroSegmentSize,

    /// The server did not report a usable content length.
    #[error("content length is unknown")]
    UnknownLength,

    /// Strategy-specific failure.
    #[error("{0}")]
    Other(String),
}

impl RangeError {
    /// Creates a strategy-specific planning error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// One segment of the resource, with inclusive bounds.
///
/// An empty range (length zero) has no upper bound and produces no request;
/// planners emit it only for zero-length resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    lower: u64,
    len: u64,
}

impl ByteRange {
    /// Creates the inclusive range `[lower, upper]`.
    ///
    /// # Panics
    ///
    /// Panics if `upper < lower`.
    #[must_use]
    pub fn new(lower: u64, upper: u64) -> Self {
        assert!(upper >= lower, "range upper bound {upper} below lower bound {lower}");
        let len = upper
            .checked_sub(lower)
            .and_then(|span| span.checked_add(1))
            .unwrap_or(u64::MAX);
        Self { lower, len }
    }

    /// Creates the range starting at `lower` spanning `len` bytes.
    #[must_use]
    pub fn with_len(lower: u64, len: u64) -> Self {
        Self { lower, len }
    }

    /// Creates an empty range positioned at `at`.
    #[must_use]
    pub fn empty(at: u64) -> Self {
        Self { lower: at, len: 0 }
    }

    /// First byte offset of the range.
    #[must_use]
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// Last byte offset of the range (inclusive), `None` when empty.
    #[must_use]
    pub fn upper(&self) -> Option<u64> {
        self.len.checked_sub(1).map(|span| self.lower + span)
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true when the range covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `Range` header value selecting this segment (`bytes=<lower>-<upper>`).
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        self.upper()
            .map(|upper| format!("bytes={}-{upper}", self.lower))
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upper() {
            Some(upper) => write!(f, "bytes={}-{upper}", self.lower),
            None => write!(f, "bytes={}-(empty)", self.lower),
        }
    }
}

/// Strategy that partitions a content length into ordered byte ranges.
pub trait Ranger: Send + Sync {
    /// Builds the plan for a resource of `content_length` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if the strategy cannot produce a valid partition.
    fn build_ranges(&self, content_length: u64) -> Result<Vec<ByteRange>, RangeError>;
}

/// Splits a resource into a fixed number of near-equal ranges.
///
/// The remainder of `len / hunks` is spread over the leading ranges, so range
/// lengths differ by at most one byte. Never produces more ranges than bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkRanger {
    hunks: u64,
}

impl HunkRanger {
    /// Creates a ranger producing at most `hunks` ranges.
    #[must_use]
    pub fn new(hunks: u64) -> Self {
        Self { hunks }
    }

    /// Returns the configured range count.
    #[must_use]
    pub fn hunks(&self) -> u64 {
        self.hunks
    }
}

impl Default for HunkRanger {
    fn default() -> Self {
        Self::new(DEFAULT_HUNKS)
    }
}

impl Ranger for HunkRanger {
    fn build_ranges(&self, content_length: u64) -> Result<Vec<ByteRange>, RangeError> {
        if self.hunks == 0 {
            return Err(RangeError::ZeroHunks);
        }
        if self.hunks > MAX_HUNKS {
            return Err(RangeError::TooManyHunks {
                hunks: self.hunks,
                max: MAX_HUNKS,
            });
        }
        if content_length == 0 {
            return Ok(vec![ByteRange::empty(0)]);
        }

        let hunks = self.hunks.min(content_length);
        let base = content_length / hunks;
        let remainder = content_length % hunks;

        let mut ranges = Vec::with_capacity(usize::try_from(hunks).unwrap_or(0));
        let mut lower = 0;
        for index in 0..hunks {
            let len = base + u64::from(index < remainder);
            ranges.push(ByteRange::with_len(lower, len));
            lower += len;
        }

        Ok(ranges)
    }
}

/// Splits a resource into ranges of a fixed size; the last range may be shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedRanger {
    segment_size: u64,
}

impl SizedRanger {
    /// Creates a ranger producing ranges of `segment_size` bytes.
    #[must_use]
    pub fn new(segment_size: u64) -> Self {
        Self { segment_size }
    }
}

impl Ranger for SizedRanger {
    fn build_ranges(&self, content_length: u64) -> Result<Vec<ByteRange>, RangeError> {
        if self.segment_size == 0 {
            return Err(RangeError::ZeroSegmentSize);
        }
        if content_length == 0 {
            return Ok(vec![ByteRange::empty(0)]);
        }

        let mut ranges = Vec::new();
        let mut lower = 0;
        while lower < content_length {
            let len = self.segment_size.min(content_length - lower);
            ranges.push(ByteRange::with_len(lower, len));
            lower += len;
        }

        Ok(ranges)
    }
}
