//! Download coordinator: plans a download, fans out one worker per segment,
//! and checkpoints, discards or merges depending on how the workers end.
//!
//! # Lifecycle
//!
//! `Planning → Running → {Completed, Cancelled, Failed}`
//!
//! - **Planning** resolves the URL, plans segments and builds the spec.
//! - **Running** saves the spec (if resumable), spawns the workers and
//!   drains every [`WorkerOutcome`] from a single channel. The first error
//!   cancels the remaining workers.
//! - **Completed** merges the segments and removes the download's storage.
//! - **Cancelled** / **Failed** save the spec with the bytes each segment
//!   holds when the download is resumable, and delete it otherwise.

mod outcome;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::config::EngineConfig;
use super::error::DownloadError;
use super::fetcher::{FetchOutcome, FetchTarget, SegmentFetcher};
use super::merge::merge_segments;
use super::planner::plan_segments;
use super::resolver::Resolver;
use super::spec::{DownloadSpec, Segment, generate_download_id};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::storage::{Storage, StorageError};

pub use outcome::{DownloadOutcome, WorkerOutcome};
use outcome::State;

/// Drives downloads against one storage backend and progress sink.
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: EngineConfig,
    resolver: Resolver,
    fetcher: SegmentFetcher,
    storage: Arc<dyn Storage>,
    progress: Arc<dyn ProgressSink>,
}

/// Everything one segment worker owns.
struct SegmentJob {
    id: String,
    segment: Segment,
    segment_count: usize,
    resume_offset: u64,
    target: Arc<FetchTarget>,
    tracker: Arc<dyn ProgressTracker>,
}

impl Coordinator {
    /// Creates a coordinator with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the HTTP client cannot be built.
    #[instrument(level = "debug", skip(storage, progress))]
    pub fn new(
        config: EngineConfig,
        storage: Arc<dyn Storage>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let client = HttpClient::new(&config)?;
        Ok(Self {
            resolver: Resolver::new(client.clone()),
            fetcher: SegmentFetcher::new(client, config.copy_chunk_size),
            config,
            storage,
            progress,
        })
    }

    /// Downloads `raw_url` into storage's output location.
    ///
    /// A saved download for the same URL is discarded first.
    ///
    /// # Errors
    ///
    /// Resolver and planner errors abort before anything is stored. Fetch and
    /// merge errors are returned after the checkpoint-or-discard step. A
    /// non-resumable download interrupted by `cancel` returns
    /// [`DownloadError::UserCancelled`].
    #[instrument(skip(self, cancel))]
    pub async fn download(
        &self,
        raw_url: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        debug!(state = State::Planning.as_str(), "state transition");
        let resource = self.resolver.resolve(raw_url).await?;
        let segments = plan_segments(
            resource.size,
            self.config.segments,
            resource.accepts_ranges,
        )?;
        self.discard_previous(&resource.url).await;

        let spec = DownloadSpec {
            id: generate_download_id(&resource.name),
            url: resource.url,
            name: resource.name,
            size: resource.size,
            version_token: resource.version_token,
            segments,
        };
        info!(id = %spec.id, segments = spec.segment_count(), size = spec.size, "download planned");

        let offsets = vec![0; spec.segment_count()];
        self.run(spec, offsets, cancel).await
    }

    /// Continues a saved download from the bytes already in storage.
    ///
    /// # Errors
    ///
    /// [`DownloadError::NotFound`] / [`DownloadError::BrokenDownload`] for an
    /// unusable id, [`DownloadError::SegmentOverflow`] when storage holds more
    /// than a segment's range, plus everything [`download`](Self::download) returns.
    #[instrument(skip(self, cancel))]
    pub async fn resume(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let mut spec = self.storage.read_spec(id).await?;
        let count = spec.segment_count();

        let mut offsets = Vec::with_capacity(count);
        for segment in &mut spec.segments {
            let stored = self
                .storage
                .segment_size(&spec.id, segment.index, count)
                .await?;
            if stored != segment.written {
                debug!(index = segment.index, recorded = segment.written, stored, "using stored segment size");
            }
            segment.written = stored;
            offsets.push(stored);
        }
        info!(id = %spec.id, written = spec.written(), size = spec.size, "resuming download");

        self.run(spec, offsets, cancel).await
    }

    /// Looks up a saved download by id, or by URL when no id matches.
    ///
    /// URLs are compared without their scheme, so `example.com/f.zip` finds a
    /// download saved as `https://example.com/f.zip`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] when nothing matches.
    pub async fn find(&self, id_or_url: &str) -> Result<DownloadSpec, DownloadError> {
        match self.storage.read_spec(id_or_url).await {
            Ok(spec) => return Ok(spec),
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let wanted = strip_scheme(id_or_url);
        self.storage
            .list_downloads()
            .await?
            .into_iter()
            .find(|spec| strip_scheme(&spec.url) == wanted)
            .ok_or_else(|| DownloadError::NotFound {
                id: id_or_url.to_string(),
            })
    }

    /// Lists saved downloads.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if storage cannot be listed.
    pub async fn list(&self) -> Result<Vec<DownloadSpec>, DownloadError> {
        Ok(self.storage.list_downloads().await?)
    }

    /// Deletes one saved download and returns what was removed.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find), plus storage deletion errors.
    pub async fn remove(&self, id_or_url: &str) -> Result<DownloadSpec, DownloadError> {
        let spec = self.find(id_or_url).await?;
        self.storage.delete_download(&spec.id).await?;
        info!(id = %spec.id, "download removed");
        Ok(spec)
    }

    /// Deletes every saved download and returns what was removed.
    ///
    /// # Errors
    ///
    /// Stops at the first storage error.
    pub async fn clear(&self) -> Result<Vec<DownloadSpec>, DownloadError> {
        let specs = self.storage.list_downloads().await?;
        for spec in &specs {
            self.storage.delete_download(&spec.id).await?;
        }
        info!(count = specs.len(), "saved downloads cleared");
        Ok(specs)
    }

    async fn discard_previous(&self, url: &str) {
        let previous = match self.storage.list_downloads().await {
            Ok(specs) => specs,
            Err(e) => {
                warn!(error = %e, "cannot list saved downloads");
                return;
            }
        };
        for spec in previous.iter().filter(|s| s.url == url) {
            warn!(id = %spec.id, url = %url, "discarding earlier saved download of the same URL");
            if let Err(e) = self.storage.delete_download(&spec.id).await {
                warn!(id = %spec.id, error = %e, "failed to discard earlier download");
            }
        }
    }

    async fn run(
        &self,
        mut spec: DownloadSpec,
        offsets: Vec<u64>,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        debug!(id = %spec.id, state = State::Running.as_str(), "state transition");
        if spec.is_resumable() {
            self.storage.write_spec(&spec).await?;
        }

        let count = spec.segment_count();
        let workers = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(count.max(1));
        let target = Arc::new(FetchTarget {
            url: spec.url.clone(),
            total_size: spec.size,
            version_token: spec.version_token.clone(),
        });

        for (segment, &resume_offset) in spec.segments.iter().zip(&offsets) {
            let tracker = self.progress.segment(
                segment.expected_len(spec.size),
                &format!("segment {}", segment.index),
            );
            let job = SegmentJob {
                id: spec.id.clone(),
                segment: segment.clone(),
                segment_count: count,
                resume_offset,
                target: Arc::clone(&target),
                tracker,
            };
            tokio::spawn(supervise(
                job,
                self.fetcher.clone(),
                Arc::clone(&self.storage),
                workers.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut failure: Option<DownloadError> = None;
        let mut interrupted = false;
        let mut finished = 0usize;

        loop {
            tokio::select! {
                () = cancel.cancelled(), if !interrupted => {
                    interrupted = true;
                    debug!(id = %spec.id, "cancellation requested, waiting for workers");
                }
                received = rx.recv() => {
                    let Some(outcome) = received else { break };
                    record_written(&mut spec, &outcome);
                    match outcome {
                        WorkerOutcome::Finished { .. } => finished += 1,
                        WorkerOutcome::Cancelled { .. } => interrupted = true,
                        WorkerOutcome::Failed { index, error, .. } => {
                            if failure.is_none() {
                                warn!(id = %spec.id, index, error = %error, "segment failed, stopping remaining workers");
                                workers.cancel();
                                failure = Some(error);
                            } else {
                                debug!(id = %spec.id, index, error = %error, "additional segment failure");
                            }
                        }
                    }
                }
            }
        }

        if let Some(error) = failure {
            debug!(id = %spec.id, state = State::Failed.as_str(), "state transition");
            self.save_or_discard(&mut spec).await;
            return Err(error);
        }

        if interrupted && finished < count {
            debug!(id = %spec.id, state = State::Cancelled.as_str(), "state transition");
            if spec.is_resumable() {
                self.checkpoint(&mut spec).await?;
                info!(id = %spec.id, written = spec.written(), "download checkpointed");
                return Ok(DownloadOutcome::Checkpointed { id: spec.id });
            }
            self.discard(&spec.id).await;
            return Err(DownloadError::UserCancelled);
        }

        if let Some(error) = first_short_segment(&spec) {
            debug!(id = %spec.id, state = State::Failed.as_str(), "state transition");
            self.save_or_discard(&mut spec).await;
            return Err(error);
        }

        self.complete(spec).await
    }

    async fn complete(&self, mut spec: DownloadSpec) -> Result<DownloadOutcome, DownloadError> {
        let report = match merge_segments(&spec, self.storage.as_ref(), self.progress.as_ref()).await {
            Ok(report) => report,
            Err(error) => {
                debug!(id = %spec.id, state = State::Failed.as_str(), "state transition");
                self.save_or_discard(&mut spec).await;
                return Err(error);
            }
        };

        if let Err(e) = self.storage.delete_download(&spec.id).await {
            warn!(id = %spec.id, error = %e, "merged, but failed to remove download storage");
        }
        debug!(id = %spec.id, state = State::Completed.as_str(), "state transition");

        Ok(DownloadOutcome::Completed {
            path: report.location,
            bytes: report.bytes,
        })
    }

    /// Saves a resumable spec with the sizes found in storage.
    async fn checkpoint(&self, spec: &mut DownloadSpec) -> Result<(), DownloadError> {
        let count = spec.segment_count();
        for segment in &mut spec.segments {
            match self
                .storage
                .segment_size(&spec.id, segment.index, count)
                .await
            {
                Ok(stored) => segment.written = stored,
                Err(e) => debug!(index = segment.index, error = %e, "keeping reported segment size"),
            }
        }
        self.storage.write_spec(spec).await?;
        Ok(())
    }

    /// Failure path: checkpoint when resumable, otherwise delete. Never fails.
    async fn save_or_discard(&self, spec: &mut DownloadSpec) {
        if spec.is_resumable() {
            if let Err(e) = self.checkpoint(spec).await {
                warn!(id = %spec.id, error = %e, "failed to save download state");
            }
        } else {
            self.discard(&spec.id).await;
        }
    }

    async fn discard(&self, id: &str) {
        if let Err(e) = self.storage.delete_download(id).await {
            warn!(id = %id, error = %e, "failed to delete download storage");
        }
    }
}

/// Runs one segment fetch, turning panics into a failed outcome.
async fn supervise(
    job: SegmentJob,
    fetcher: SegmentFetcher,
    storage: Arc<dyn Storage>,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerOutcome>,
) {
    let index = job.segment.index;
    let resume_offset = job.resume_offset;
    job.tracker.inc(resume_offset);

    let result = AssertUnwindSafe(fetch_segment(&job, &fetcher, storage.as_ref(), &cancel))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(FetchOutcome::Completed { written })) => WorkerOutcome::Finished { index, written },
        Ok(Ok(FetchOutcome::AlreadyComplete)) => WorkerOutcome::Finished {
            index,
            written: resume_offset,
        },
        Ok(Ok(FetchOutcome::Cancelled { written })) => WorkerOutcome::Cancelled { index, written },
        Ok(Err(error)) => WorkerOutcome::Failed {
            index,
            written: resume_offset,
            error,
        },
        Err(payload) => WorkerOutcome::Failed {
            index,
            written: resume_offset,
            error: DownloadError::WorkerPanicked {
                index,
                message: panic_message(payload.as_ref()),
            },
        },
    };
    job.tracker.finish();

    if tx.send(outcome).await.is_err() {
        debug!(index, "coordinator stopped listening");
    }
}

async fn fetch_segment(
    job: &SegmentJob,
    fetcher: &SegmentFetcher,
    storage: &dyn Storage,
    cancel: &CancellationToken,
) -> Result<FetchOutcome, DownloadError> {
    let mut sink = storage
        .open_segment_writer(&job.id, job.segment.index, job.segment_count)
        .await?;
    fetcher
        .fetch(
            &job.target,
            &job.segment,
            job.resume_offset,
            &mut sink,
            job.tracker.as_ref(),
            cancel,
        )
        .await
}

fn record_written(spec: &mut DownloadSpec, outcome: &WorkerOutcome) {
    if let Some(segment) = spec
        .segments
        .iter_mut()
        .find(|s| s.index == outcome.index())
    {
        segment.written = outcome.written();
    }
}

/// Returns an error for the first bounded segment the server cut short.
fn first_short_segment(spec: &DownloadSpec) -> Option<DownloadError> {
    spec.segments.iter().find_map(|segment| {
        let expected = segment.expected_len(spec.size)?;
        (segment.written < expected).then(|| DownloadError::IncompleteSegment {
            index: segment.index,
            written: segment.written,
            expected,
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}
