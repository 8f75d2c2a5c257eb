//! Engine configuration, built once and passed explicitly.

use std::time::Duration;

use super::constants::{
    CONNECT_TIMEOUT_SECS, COPY_CHUNK_SIZE, FALLBACK_SEGMENTS, MAX_SEGMENTS, READ_TIMEOUT_SECS,
};
use super::error::DownloadError;

/// Tunables shared by the resolver, fetchers and coordinator of one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Requested number of segments for new downloads.
    pub segments: usize,
    /// Upper bound on bytes written per copy step.
    pub copy_chunk_size: usize,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle time while waiting for response bytes.
    pub read_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segments: default_segments(),
            copy_chunk_size: COPY_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Sets the requested segment count.
    #[must_use]
    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    /// Sets the copy chunk size.
    #[must_use]
    pub fn with_copy_chunk_size(mut self, copy_chunk_size: usize) -> Self {
        self.copy_chunk_size = copy_chunk_size;
        self
    }

    /// Checks the values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidSegmentCount`] when `segments` is outside
    /// `1..=MAX_SEGMENTS`, or [`DownloadError::InvalidChunkSize`] when the copy
    /// chunk size is 0.
    pub fn validate(&self) -> Result<(), DownloadError> {
        if !(1..=MAX_SEGMENTS).contains(&self.segments) {
            return Err(DownloadError::InvalidSegmentCount {
                value: self.segments,
            });
        }
        if self.copy_chunk_size == 0 {
            return Err(DownloadError::InvalidChunkSize);
        }
        Ok(())
    }
}

/// Returns the machine's available parallelism, capped at [`MAX_SEGMENTS`].
#[must_use]
pub fn default_segments() -> usize {
    std::thread::available_parallelism()
        .map_or(FALLBACK_SEGMENTS, std::num::NonZeroUsize::get)
        .min(MAX_SEGMENTS)
}
