//! Error types for the download engine.
//!
//! Every fatal condition surfaced to the caller maps onto one [`ErrorKind`],
//! the user-facing taxonomy printed by the CLI.

use std::fmt;

use thiserror::Error;

use crate::storage::StorageError;

/// Coarse classification of a [`DownloadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnresolvableUrl,
    InvalidFilename,
    NetworkError,
    VersionMismatch,
    FilesystemError,
    SegmentOverflow,
    UserCancelled,
    BrokenDownload,
    NotFound,
    InvalidInput,
}

impl ErrorKind {
    /// Returns the stable label used in CLI output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnresolvableUrl => "UnresolvableURL",
            Self::InvalidFilename => "InvalidFilename",
            Self::NetworkError => "NetworkError",
            Self::VersionMismatch => "VersionMismatch",
            Self::FilesystemError => "FilesystemError",
            Self::SegmentOverflow => "SegmentOverflow",
            Self::UserCancelled => "UserCancelled",
            Self::BrokenDownload => "BrokenDownload",
            Self::NotFound => "NotFound",
            Self::InvalidInput => "InvalidInput",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while resolving, fetching, checkpointing or merging a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Neither the given URL nor its `https://`/`http://` variants answered.
    #[error("cannot resolve {input} using https or http")]
    UnresolvableUrl {
        /// The raw user input.
        input: String,
    },

    /// The derived filename is unsafe to use as a local path.
    #[error("invalid filename {name:?}")]
    InvalidFilename {
        /// The rejected name.
        name: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS, body read).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server answered a ranged request with the full entity.
    #[error("server ignored range request at offset {offset} for {url}")]
    RangeNotHonored {
        /// The URL being fetched.
        url: String,
        /// The requested start offset.
        offset: u64,
    },

    /// A worker task panicked; routed like a network failure of its segment.
    #[error("segment {index} worker panicked: {message}")]
    WorkerPanicked {
        /// Segment index of the failed worker.
        index: u32,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The remote resource changed since the download was started.
    #[error("resource at {url} changed (expected version {expected}, got {})", .actual.as_deref().unwrap_or("none"))]
    VersionMismatch {
        /// The URL being fetched.
        url: String,
        /// Version token captured when the download was created.
        expected: String,
        /// Version token returned by the server now.
        actual: Option<String>,
    },

    /// A segment holds more bytes than its range allows.
    #[error("segment {index} overflow: {written} bytes stored, {expected} expected")]
    SegmentOverflow {
        /// Segment index.
        index: u32,
        /// Bytes found in storage.
        written: u64,
        /// Bytes the range can hold.
        expected: u64,
    },

    /// The download was interrupted and nothing could be checkpointed.
    #[error("download cancelled by user")]
    UserCancelled,

    /// The requested download does not exist.
    #[error("download {id} does not exist")]
    NotFound {
        /// The requested id.
        id: String,
    },

    /// The persisted download spec is unreadable or corrupt.
    #[error("download {id} is broken: {reason}")]
    BrokenDownload {
        /// The download id.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Reading or writing local storage failed.
    #[error("filesystem error: {source}")]
    Filesystem {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// A segment stream ended before its range was filled.
    #[error("segment {index} ended early: {written} of {expected} bytes received")]
    IncompleteSegment {
        /// Segment index.
        index: u32,
        /// Bytes stored for the segment.
        written: u64,
        /// Bytes the range should hold.
        expected: u64,
    },

    /// The HTTP client could not be constructed.
    #[error("cannot build HTTP client: {source}")]
    ClientBuild {
        /// The builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Segment count outside the accepted range.
    #[error("invalid segment count {value}: must be between 1 and 64")]
    InvalidSegmentCount {
        /// The rejected count.
        value: usize,
    },

    /// Copy chunk size must be at least one byte.
    #[error("invalid copy chunk size: must be at least 1 byte")]
    InvalidChunkSize,
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an unresolvable URL error.
    pub fn unresolvable(input: impl Into<String>) -> Self {
        Self::UnresolvableUrl {
            input: input.into(),
        }
    }

    /// Creates an invalid filename error.
    pub fn invalid_filename(name: impl Into<String>) -> Self {
        Self::InvalidFilename { name: name.into() }
    }

    /// Creates a version mismatch error.
    pub fn version_mismatch(
        url: impl Into<String>,
        expected: impl Into<String>,
        actual: Option<String>,
    ) -> Self {
        Self::VersionMismatch {
            url: url.into(),
            expected: expected.into(),
            actual,
        }
    }

    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnresolvableUrl { .. } => ErrorKind::UnresolvableUrl,
            Self::InvalidFilename { .. } => ErrorKind::InvalidFilename,
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::RangeNotHonored { .. }
            | Self::WorkerPanicked { .. }
            | Self::IncompleteSegment { .. }
            | Self::ClientBuild { .. } => ErrorKind::NetworkError,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::SegmentOverflow { .. } => ErrorKind::SegmentOverflow,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BrokenDownload { .. } => ErrorKind::BrokenDownload,
            Self::Filesystem { .. } => ErrorKind::FilesystemError,
            Self::InvalidSegmentCount { .. } | Self::InvalidChunkSize => ErrorKind::InvalidInput,
        }
    }
}

// Storage errors already carry their path or id, so a plain conversion loses nothing.
impl From<StorageError> for DownloadError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { id } => Self::NotFound { id },
            StorageError::Broken { id, reason } => Self::BrokenDownload { id, reason },
            source => Self::Filesystem { source },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_kind_labels_match_taxonomy() {
        assert_eq!(
            DownloadError::unresolvable("example").kind().to_string(),
            "UnresolvableURL"
        );
        assert_eq!(
            DownloadError::invalid_filename("..").kind(),
            ErrorKind::InvalidFilename
        );
        assert_eq!(
            DownloadError::http_status("https://example.com/a.bin", 503).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(DownloadError::UserCancelled.kind(), ErrorKind::UserCancelled);
    }

    #[test]
    fn test_version_mismatch_display_names_both_tokens() {
        let error = DownloadError::version_mismatch(
            "https://example.com/a.bin",
            "\"v1\"",
            Some("\"v2\"".to_string()),
        );
        let msg = error.to_string();
        assert!(msg.contains("\"v1\""), "Expected old token in: {msg}");
        assert!(msg.contains("\"v2\""), "Expected new token in: {msg}");
        assert_eq!(error.kind(), ErrorKind::VersionMismatch);
    }

    #[test]
    fn test_version_mismatch_display_missing_token() {
        let error = DownloadError::version_mismatch("https://example.com/a.bin", "abc", None);
        assert!(error.to_string().contains("got none"));
    }

    #[test]
    fn test_storage_error_conversion() {
        let not_found: DownloadError = StorageError::NotFound {
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let broken: DownloadError = StorageError::Broken {
            id: "abc".to_string(),
            reason: "truncated".to_string(),
        }
        .into();
        assert_eq!(broken.kind(), ErrorKind::BrokenDownload);

        let io: DownloadError = StorageError::io(
            PathBuf::from("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        assert_eq!(io.kind(), ErrorKind::FilesystemError);
        assert!(io.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_segment_overflow_display() {
        let error = DownloadError::SegmentOverflow {
            index: 2,
            written: 60,
            expected: 50,
        };
        let msg = error.to_string();
        assert!(msg.contains("segment 2"));
        assert!(msg.contains("60"));
        assert_eq!(error.kind(), ErrorKind::SegmentOverflow);
    }
}
