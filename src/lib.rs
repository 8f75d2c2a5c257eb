//! hget core library
//!
//! Interruptible, resumable segmented downloads over HTTP(S).
//!
//! # Architecture
//!
//! - [`download`] - resolver, segment planner, fetchers, coordinator and merge stage
//! - [`storage`] - persistence of download specs and segment bytes
//! - [`progress`] - progress reporting seam used by fetchers and merge

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod progress;
pub mod storage;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use download::{
    Coordinator, DownloadError, DownloadOutcome, DownloadSpec, EngineConfig, ErrorKind, Segment,
    plan_segments, readable_size,
};
pub use progress::{NoopProgress, ProgressSink, ProgressTracker, TerminalProgress};
pub use storage::{FsStorage, MemoryStorage, Storage, StorageError};
