//! Merge stage: concatenates completed segments into the output file.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use super::spec::DownloadSpec;
use crate::progress::ProgressSink;
use crate::storage::{OutputSink, Storage, StorageError};

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Where the merged file was written.
    pub location: PathBuf,
    /// Total bytes written to the output.
    pub bytes: u64,
    /// Number of segments merged.
    pub segments: usize,
}

/// Appends every segment to the output in index order, deleting each one once copied.
///
/// Storage listing order is never consulted. If segment `k` fails, segments
/// before it are already merged and deleted while `k` and later stay intact,
/// and the partial output is removed so no truncated file is left behind.
///
/// # Errors
///
/// Returns [`DownloadError::Filesystem`] for any read, write or delete failure.
#[instrument(skip(spec, storage, progress), fields(id = %spec.id))]
pub async fn merge_segments(
    spec: &DownloadSpec,
    storage: &dyn Storage,
    progress: &dyn ProgressSink,
) -> Result<MergeReport, DownloadError> {
    let mut output = storage.open_output(spec).await?;
    let location = output.location.clone();

    match copy_segments(spec, storage, progress, &mut output).await {
        Ok(bytes) => {
            info!(location = %location.display(), bytes, "download merged");
            Ok(MergeReport {
                location,
                bytes,
                segments: spec.segment_count(),
            })
        }
        Err(error) => {
            drop(output);
            if let Err(e) = storage.discard_output(&location).await {
                warn!(location = %location.display(), error = %e, "failed to remove partial output");
            }
            Err(error)
        }
    }
}

async fn copy_segments(
    spec: &DownloadSpec,
    storage: &dyn Storage,
    progress: &dyn ProgressSink,
    output: &mut OutputSink,
) -> Result<u64, DownloadError> {
    let mut segments: Vec<_> = spec.segments.iter().collect();
    segments.sort_by_key(|s| s.index);
    let count = spec.segment_count();

    let tracker = progress.merge(count);
    let location = output.location.clone();
    let io_error = |e| DownloadError::Filesystem {
        source: StorageError::io(location.clone(), e),
    };

    let mut bytes = 0u64;
    for segment in segments {
        let mut reader = storage
            .open_segment_reader(&spec.id, segment.index, count)
            .await?;
        let copied = tokio::io::copy(&mut reader, &mut output.writer)
            .await
            .map_err(io_error)?;
        output.writer.flush().await.map_err(io_error)?;
        storage
            .delete_segment(&spec.id, segment.index, count)
            .await?;
        bytes += copied;
        tracker.inc(1);
        debug!(index = segment.index, copied, "segment merged");
    }

    output.writer.shutdown().await.map_err(io_error)?;
    tracker.finish();
    Ok(bytes)
}
