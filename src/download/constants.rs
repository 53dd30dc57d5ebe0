//! Constants for the download module (timeouts, streaming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for slow segments).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Upper bound on the concurrency setting.
pub const MAX_CONCURRENCY: usize = 100;
