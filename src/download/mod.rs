//! Segmented download engine.
//!
//! A download flows through these stages:
//!
//! 1. [`Resolver`] probes the URL for size, range support, ETag and filename
//! 2. [`plan_segments`] splits the byte range into contiguous segments
//! 3. [`Coordinator`] spawns one [`SegmentFetcher`] task per segment
//! 4. [`merge_segments`] concatenates the segments into the output file
//!
//! Interrupted downloads are checkpointed through [`crate::storage::Storage`]
//! and continued with [`Coordinator::resume`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hget_core::download::{Coordinator, DownloadOutcome, EngineConfig};
//! use hget_core::progress::NoopProgress;
//! use hget_core::storage::FsStorage;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(FsStorage::new("/tmp/hget", "."));
//! let coordinator = Coordinator::new(EngineConfig::default(), storage, Arc::new(NoopProgress))?;
//! match coordinator.download("https://example.com/file.tar.gz", &CancellationToken::new()).await? {
//!     DownloadOutcome::Completed { path, .. } => println!("saved {}", path.display()),
//!     DownloadOutcome::Checkpointed { id } => println!("resume with {id}"),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
pub mod constants;
mod coordinator;
mod error;
mod fetcher;
pub mod filename;
mod merge;
mod planner;
mod resolver;
mod spec;

pub use client::HttpClient;
pub use config::{EngineConfig, default_segments};
pub use coordinator::{Coordinator, DownloadOutcome, WorkerOutcome};
pub use error::{DownloadError, ErrorKind};
pub use fetcher::{FetchOutcome, FetchTarget, SegmentFetcher};
pub use merge::{MergeReport, merge_segments};
pub use planner::plan_segments;
pub use resolver::{Resolver, Resource};
pub use spec::{DownloadSpec, Segment, generate_download_id, readable_size};

// Use `Result<T, DownloadError>` explicitly in function signatures; no module-local alias.
