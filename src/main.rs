//! CLI entry point for hget.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hget_core::download::{Coordinator, DownloadError, DownloadOutcome, ErrorKind};
use hget_core::progress::{NoopProgress, ProgressSink, TerminalProgress};
use hget_core::storage::FsStorage;
use hget_core::{DownloadSpec, readable_size};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", format_error(&error));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file_config = app_config::load_file_config(cli.config.as_deref())?;
    init_tracing(app_config::resolve_default_log_level(&cli, file_config.as_ref()));
    debug!(?cli, "CLI arguments parsed");

    let settings = app_config::resolve_runtime_settings(&cli, file_config.as_ref());
    debug!(?settings, "runtime settings resolved");

    let storage = Arc::new(FsStorage::new(&settings.program_folder, &settings.output_dir));
    let progress: Arc<dyn ProgressSink> = if !cli.quiet && std::io::stderr().is_terminal() {
        Arc::new(TerminalProgress::new())
    } else {
        Arc::new(NoopProgress)
    };
    let coordinator = Coordinator::new(settings.engine, storage, progress)?;

    match cli.command {
        Some(Command::List) => {
            let specs = coordinator.list().await?;
            if specs.is_empty() {
                println!("No saved downloads.");
            }
            for spec in &specs {
                println!("{spec}");
            }
        }
        Some(Command::Clear) => {
            for spec in coordinator.clear().await? {
                println!("removed {}", spec.id);
            }
        }
        Some(Command::Remove { target }) => {
            let spec = coordinator.remove(&target).await?;
            println!("removed {}", spec.id);
        }
        Some(Command::Resume { target }) => {
            let spec = coordinator.find(&target).await?;
            print_resume_banner(&spec);
            let cancel = cancellation_token(settings.timeout);
            report(coordinator.resume(&spec.id, &cancel).await?);
        }
        None => {
            let url = cli
                .url
                .context("a URL or a subcommand is required")?;
            let cancel = cancellation_token(settings.timeout);
            report(coordinator.download(&url, &cancel).await?);
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    // Priority: RUST_LOG env var > CLI flags > config file > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_resume_banner(spec: &DownloadSpec) {
    info!(
        id = %spec.id,
        downloaded = %readable_size(spec.written()),
        size = %readable_size(spec.size),
        "resuming"
    );
}

fn report(outcome: DownloadOutcome) {
    match outcome {
        DownloadOutcome::Completed { path, bytes } => {
            println!("saved {} ({})", path.display(), readable_size(bytes));
        }
        DownloadOutcome::Checkpointed { id } => {
            println!("interrupted; continue with: hget resume {id}");
        }
    }
}

/// Token cancelled on a shutdown signal or when `timeout` elapses.
fn cancellation_token(timeout: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("interrupt received, saving progress");
        token.cancel();
    });

    if let Some(timeout) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(secs = timeout.as_secs(), "timeout reached, saving progress");
            token.cancel();
        });
    }

    cancel
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut streams = Vec::new();
    for kind in [
        SignalKind::interrupt(),
        SignalKind::terminate(),
        SignalKind::hangup(),
        SignalKind::quit(),
    ] {
        match signal(kind) {
            Ok(stream) => streams.push(stream),
            Err(e) => warn!(error = %e, "cannot install signal handler"),
        }
    }
    if streams.is_empty() {
        return std::future::pending().await;
    }

    let waits = streams.iter_mut().map(|s| Box::pin(s.recv()));
    futures_util::future::select_all(waits).await;
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Renders the single `error: [<Kind>] <message>` line printed on failure.
fn format_error(error: &anyhow::Error) -> String {
    let kind = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<DownloadError>())
        .map_or(ErrorKind::InvalidInput, DownloadError::kind);
    format!("error: [{kind}] {error:#}")
}
