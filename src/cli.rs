//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Interruptible and resumable segmented download accelerator.
///
/// Splits a download into byte ranges fetched in parallel. Interrupt it with
/// Ctrl-C and continue later with `hget resume <ID|URL>`.
#[derive(Parser, Debug)]
#[command(name = "hget")]
#[command(author, version, about)]
#[command(args_conflicts_with_subcommands = true, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// URL to download (the scheme may be omitted)
    pub url: Option<String>,

    /// Number of parallel segments (1-64, default: available CPU parallelism)
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub segments: Option<u8>,

    /// Directory for finished downloads (default: current directory)
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Stop and checkpoint after this many seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Commands operating on saved downloads.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Continue an interrupted download
    Resume {
        /// Download id or URL
        target: String,
    },
    /// Delete a saved download and its segments
    Remove {
        /// Download id or URL
        target: String,
    },
    /// List saved downloads
    List,
    /// Delete every saved download
    Clear,
}
