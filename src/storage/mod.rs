//! Persistence layer for download specs and segment byte streams.
//!
//! The coordinator and merge stage only talk to the [`Storage`] trait, so the
//! same engine runs against the real filesystem ([`FsStorage`]) or an
//! in-memory store ([`MemoryStorage`]) in tests.
//!
//! # Layout
//!
//! [`FsStorage`] keeps one directory per download, named by its id:
//!
//! ```text
//! <program_folder>/downloads/<id>/download.json
//! <program_folder>/downloads/<id>/segment.00
//! <program_folder>/downloads/<id>/segment.01
//! ```
//!
//! Segment names are zero-padded (see [`segment_file_name`]) so that
//! lexicographic order equals numeric order.

mod fs;
mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::download::DownloadSpec;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

/// Boxed writer handed out for segment and output streams.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed reader handed out for segment streams.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Errors raised by a [`Storage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O operation on a storage object failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path (or in-memory key) of the object.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No download with this id exists.
    #[error("download {id} does not exist")]
    NotFound {
        /// The requested id.
        id: String,
    },

    /// The spec exists but cannot be decoded.
    #[error("download {id} is broken: {reason}")]
    Broken {
        /// The download id.
        id: String,
        /// Decoder or read failure description.
        reason: String,
    },

    /// The spec could not be encoded.
    #[error("cannot encode download {id}: {source}")]
    Encode {
        /// The download id.
        id: String,
        /// The serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Destination of a merged download.
pub struct OutputSink {
    /// Where the merged bytes end up (a file path, or a key for in-memory storage).
    pub location: PathBuf,
    /// Write half for the merged bytes.
    pub writer: BoxedWriter,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Storage backend for download specs, segment streams and merged output.
///
/// Implementations must be safe to share across the fetcher tasks of one
/// download; each segment object is only ever opened by its own fetcher while
/// the download is running.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Lists every readable download spec. Broken entries are skipped.
    async fn list_downloads(&self) -> Result<Vec<DownloadSpec>, StorageError>;

    /// Reads one download spec.
    async fn read_spec(&self, id: &str) -> Result<DownloadSpec, StorageError>;

    /// Writes (creates or replaces) a download spec.
    async fn write_spec(&self, spec: &DownloadSpec) -> Result<(), StorageError>;

    /// Opens a segment for appending, creating it when absent.
    async fn open_segment_writer(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<BoxedWriter, StorageError>;

    /// Opens a segment for reading from its first byte.
    async fn open_segment_reader(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<BoxedReader, StorageError>;

    /// Returns the bytes already stored for a segment (0 when absent).
    async fn segment_size(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<u64, StorageError>;

    /// Deletes one segment object.
    async fn delete_segment(
        &self,
        id: &str,
        index: u32,
        segment_count: usize,
    ) -> Result<(), StorageError>;

    /// Opens the destination for the merged download.
    async fn open_output(&self, spec: &DownloadSpec) -> Result<OutputSink, StorageError>;

    /// Removes a partially merged output. Removing an absent output succeeds.
    async fn discard_output(&self, location: &Path) -> Result<(), StorageError>;

    /// Deletes the spec and every remaining segment. Deleting an absent download succeeds.
    async fn delete_download(&self, id: &str) -> Result<(), StorageError>;
}

/// Returns the zero-padded file name of a segment.
///
/// The width is the number of digits of the highest index, never less than 2,
/// so names sort lexicographically in index order.
#[must_use]
pub fn segment_file_name(index: u32, segment_count: usize) -> String {
    let highest = segment_count.saturating_sub(1);
    let width = highest.to_string().len().max(2);
    format!("segment.{index:0width$}")
}
