//! Progress reporting for segment transfers and the merge stage.
//!
//! The engine only sees the [`ProgressSink`] and [`ProgressTracker`] traits.
//! [`TerminalProgress`] renders one `indicatif` bar per segment; [`NoopProgress`]
//! discards everything and is used when stderr is not a terminal and in tests.

use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Receives byte (or segment) counts for one unit of work.
pub trait ProgressTracker: Send + Sync {
    /// Adds `delta` to the tracked position.
    fn inc(&self, delta: u64);
    /// Marks the work as done.
    fn finish(&self);
}

/// Hands out trackers for each segment and for the merge.
pub trait ProgressSink: Send + Sync + std::fmt::Debug {
    /// Creates a tracker for one segment. `total` is `None` when the length is unknown.
    fn segment(&self, total: Option<u64>, prefix: &str) -> Arc<dyn ProgressTracker>;
    /// Creates a tracker counting merged segments.
    fn merge(&self, segment_count: usize) -> Arc<dyn ProgressTracker>;
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

struct NoopTracker;

impl ProgressTracker for NoopTracker {
    fn inc(&self, _delta: u64) {}
    fn finish(&self) {}
}

impl ProgressSink for NoopProgress {
    fn segment(&self, _total: Option<u64>, _prefix: &str) -> Arc<dyn ProgressTracker> {
        Arc::new(NoopTracker)
    }

    fn merge(&self, _segment_count: usize) -> Arc<dyn ProgressTracker> {
        Arc::new(NoopTracker)
    }
}

const SEGMENT_TEMPLATE: &str =
    "{prefix:>12} [{bar:30}] {bytes}/{total_bytes} {binary_bytes_per_sec} {eta}";
const STREAM_TEMPLATE: &str = "{prefix:>12} {spinner} {bytes} {binary_bytes_per_sec}";
const MERGE_TEMPLATE: &str = "{prefix:>12} [{bar:30}] {pos}/{len} segments";

/// Renders stacked progress bars on stderr.
#[derive(Debug, Clone, Default)]
pub struct TerminalProgress {
    multi: MultiProgress,
}

impl TerminalProgress {
    /// Creates an empty bar stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_bar(&self, bar: ProgressBar, template: &str, prefix: String) -> Arc<dyn ProgressTracker> {
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(prefix);
        Arc::new(BarTracker(self.multi.add(bar)))
    }
}

struct BarTracker(ProgressBar);

impl ProgressTracker for BarTracker {
    fn inc(&self, delta: u64) {
        self.0.inc(delta);
    }

    fn finish(&self) {
        self.0.finish();
    }
}

impl ProgressSink for TerminalProgress {
    fn segment(&self, total: Option<u64>, prefix: &str) -> Arc<dyn ProgressTracker> {
        match total {
            Some(len) => self.add_bar(ProgressBar::new(len), SEGMENT_TEMPLATE, prefix.to_string()),
            None => self.add_bar(
                ProgressBar::new_spinner(),
                STREAM_TEMPLATE,
                prefix.to_string(),
            ),
        }
    }

    fn merge(&self, segment_count: usize) -> Arc<dyn ProgressTracker> {
        let len = u64::try_from(segment_count).unwrap_or(u64::MAX);
        self.add_bar(ProgressBar::new(len), MERGE_TEMPLATE, "merging".to_string())
    }
}
