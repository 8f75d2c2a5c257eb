//! Segment fetcher: streams one byte range into its storage object.

use std::path::PathBuf;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::ETAG;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::error::DownloadError;
use super::spec::Segment;
use crate::progress::ProgressTracker;
use crate::storage::StorageError;

/// Download-wide facts every segment request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Source URL.
    pub url: String,
    /// Total size in bytes, 0 when unknown.
    pub total_size: u64,
    /// ETag the live resource must still carry.
    pub version_token: Option<String>,
}

/// How a segment fetch ended.
///
/// `written` is the number of bytes the segment's storage object holds when
/// the fetch returns, including bytes present before it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response body was fully copied.
    Completed { written: u64 },
    /// Storage already held the whole range; no request was made.
    AlreadyComplete,
    /// Cancellation was observed; the stored bytes are a valid checkpoint.
    Cancelled { written: u64 },
}

/// Fetches byte ranges with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct SegmentFetcher {
    client: HttpClient,
    copy_chunk_size: usize,
}

impl SegmentFetcher {
    /// Creates a fetcher writing at most `copy_chunk_size` bytes per step.
    #[must_use]
    pub fn new(client: HttpClient, copy_chunk_size: usize) -> Self {
        Self {
            client,
            copy_chunk_size: copy_chunk_size.max(1),
        }
    }

    /// Fetches `segment` starting `resume_offset` bytes into it and appends to `sink`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::SegmentOverflow`] if storage already holds more than the range
    /// - [`DownloadError::RangeNotHonored`] if a resumed request gets a full `200` body
    /// - [`DownloadError::VersionMismatch`] if the ETag changed (nothing is written)
    /// - network, HTTP status or filesystem errors while streaming
    #[instrument(skip(self, target, segment, sink, progress, cancel), fields(index = segment.index, url = %target.url))]
    pub async fn fetch<W>(
        &self,
        target: &FetchTarget,
        segment: &Segment,
        resume_offset: u64,
        sink: &mut W,
        progress: &dyn ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let expected = segment.expected_len(target.total_size);
        let remaining = match expected {
            Some(len) if resume_offset == len => {
                debug!("segment already complete");
                return Ok(FetchOutcome::AlreadyComplete);
            }
            Some(len) if resume_offset > len => {
                return Err(DownloadError::SegmentOverflow {
                    index: segment.index,
                    written: resume_offset,
                    expected: len,
                });
            }
            Some(len) => Some(len - resume_offset),
            None => None,
        };

        if cancel.is_cancelled() {
            return Ok(FetchOutcome::Cancelled {
                written: resume_offset,
            });
        }

        let start = segment.start + resume_offset;
        let range = range_header(segment, start, target.total_size);
        debug!(range = ?range, "requesting segment");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Ok(FetchOutcome::Cancelled { written: resume_offset });
            }
            response = self.client.get_range(&target.url, range.as_deref()) => response?,
        };

        if start > 0 && response.status() == StatusCode::OK {
            return Err(DownloadError::RangeNotHonored {
                url: target.url.clone(),
                offset: start,
            });
        }

        if let Some(expected_token) = &target.version_token {
            let actual = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            if actual.as_deref() != Some(expected_token.as_str()) {
                return Err(DownloadError::version_mismatch(
                    target.url.as_str(),
                    expected_token.as_str(),
                    actual,
                ));
            }
        }

        let sink_label = || PathBuf::from(format!("segment {}", segment.index));
        let write_error = |e| DownloadError::Filesystem {
            source: StorageError::io(sink_label(), e),
        };

        let mut stream = response.bytes_stream();
        let mut written = resume_offset;
        let mut remaining = remaining;

        'body: loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    sink.flush().await.map_err(write_error)?;
                    debug!(written, "segment cancelled");
                    return Ok(FetchOutcome::Cancelled { written });
                }
                next = stream.next() => next,
            };

            let bytes = match next {
                None => break,
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    // Keep what arrived so far as the checkpoint.
                    sink.flush().await.map_err(write_error)?;
                    return Err(DownloadError::network(target.url.as_str(), e));
                }
            };

            for chunk in bytes.chunks(self.copy_chunk_size) {
                if cancel.is_cancelled() {
                    sink.flush().await.map_err(write_error)?;
                    debug!(written, "segment cancelled");
                    return Ok(FetchOutcome::Cancelled { written });
                }

                // A server ignoring the range for offset 0 would send the whole entity.
                let take = remaining.map_or(chunk.len(), |left| {
                    usize::try_from(left).map_or(chunk.len(), |left| left.min(chunk.len()))
                });
                sink.write_all(&chunk[..take])
                    .await
                    .map_err(write_error)?;
                let take = take as u64;
                written += take;
                progress.inc(take);

                if let Some(left) = remaining.as_mut() {
                    *left -= take;
                    if *left == 0 {
                        break 'body;
                    }
                }
            }
        }

        sink.flush().await.map_err(write_error)?;
        debug!(written, "segment finished");
        Ok(FetchOutcome::Completed { written })
    }
}

/// Builds the `Range` header for a request starting at absolute offset `start`.
///
/// No header is sent when the whole resource is fetched from the beginning.
/// The open-ended last segment omits the upper bound.
fn range_header(segment: &Segment, start: u64, total_size: u64) -> Option<String> {
    let open_ended = segment.is_open_ended(total_size);
    if open_ended && start == 0 {
        None
    } else if open_ended {
        Some(format!("bytes={start}-"))
    } else {
        Some(format!("bytes={start}-{}", segment.end))
    }
}
