//! Constants for the download module (timeouts, pacing, streaming).

use std::time::Duration;

/// Default upper bound for connecting and for each body read (120 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default pause before each request, to stay under remote rate limits.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

/// Size of the pieces the response body is written in (8 KiB).
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Minimum time between two progress samples of one transfer.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Suffix of a body still being streamed; renamed away once complete.
pub const PARTIAL_SUFFIX: &str = ".part";
