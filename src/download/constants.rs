//! Constants for the download module (timeouts, copy buffer, segment limits).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes between body chunks on slow links).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of bytes copied from the network per write (32 KiB).
pub const COPY_CHUNK_SIZE: usize = 32 * 1024;

/// Largest segment count accepted from user input.
pub const MAX_SEGMENTS: usize = 64;

/// Segment count used when the available parallelism cannot be queried.
pub const FALLBACK_SEGMENTS: usize = 4;
