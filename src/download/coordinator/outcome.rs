//! Results reported by segment workers and by the coordinator.

use std::path::PathBuf;

use crate::download::error::DownloadError;

/// The single message each segment worker sends when it stops.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// The segment holds its whole range (or the stream ended for an unknown size).
    Finished { index: u32, written: u64 },
    /// The worker stopped because cancellation was requested.
    Cancelled { index: u32, written: u64 },
    /// The worker failed. `written` is the last size known to be stored.
    Failed {
        index: u32,
        written: u64,
        error: DownloadError,
    },
}

impl WorkerOutcome {
    /// Segment index of the reporting worker.
    #[must_use]
    pub fn index(&self) -> u32 {
        match self {
            Self::Finished { index, .. } | Self::Cancelled { index, .. } | Self::Failed { index, .. } => {
                *index
            }
        }
    }

    /// Bytes stored for the segment when the worker stopped.
    #[must_use]
    pub fn written(&self) -> u64 {
        match self {
            Self::Finished { written, .. }
            | Self::Cancelled { written, .. }
            | Self::Failed { written, .. } => *written,
        }
    }
}

/// How a download run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Every segment was fetched and merged; storage for the id is gone.
    Completed {
        /// Output location chosen by storage.
        path: PathBuf,
        /// Bytes in the merged output.
        bytes: u64,
    },
    /// Interrupted and checkpointed; resumable with this id.
    Checkpointed {
        /// Id to pass to resume.
        id: String,
    },
}

/// Coordinator lifecycle, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Planning,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl State {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}
