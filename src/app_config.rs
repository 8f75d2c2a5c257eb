//! Application configuration loading and CLI/file precedence.
//!
//! The config file is a flat `key = value` subset of TOML:
//!
//! ```toml
//! program_folder = "/home/me/.hget"
//! output_dir = "/home/me/Downloads"
//! segments = 8
//! copy_chunk_size = 65536
//! connect_timeout_secs = 30
//! read_timeout_secs = 300
//! verbosity = "verbose"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hget_core::download::constants::MAX_SEGMENTS;
use hget_core::download::{EngineConfig, default_segments};

use crate::cli::Cli;

/// Largest accepted `copy_chunk_size` (16 MiB).
const MAX_COPY_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Largest accepted connect or read timeout.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Folder under `$HOME` holding saved downloads when none is configured.
const DEFAULT_PROGRAM_FOLDER: &str = ".hget";

/// TOML-backed file configuration for hget defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Where saved downloads and segments live.
    pub program_folder: Option<PathBuf>,
    /// Default output directory for merged files.
    pub output_dir: Option<PathBuf>,
    /// Default segment count (same range as the CLI).
    pub segments: Option<usize>,
    /// Bytes written per copy step.
    pub copy_chunk_size: Option<usize>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Log level used when neither `RUST_LOG` nor `-v`/`-q` is given.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against engine and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(segments) = self.segments
            && !(1..=MAX_SEGMENTS).contains(&segments)
        {
            bail!("Invalid config value for `segments`: {segments}. Expected range: 1..={MAX_SEGMENTS}");
        }
        if let Some(chunk) = self.copy_chunk_size
            && !(1..=MAX_COPY_CHUNK_SIZE).contains(&(chunk as u64))
        {
            bail!(
                "Invalid config value for `copy_chunk_size`: {chunk}. Expected range: 1..={MAX_COPY_CHUNK_SIZE}"
            );
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    match value {
        Some(secs) if !(1..=MAX_TIMEOUT_SECS).contains(&secs) => bail!(
            "Invalid config value for `{field}`: {secs}. Expected range: 1..={MAX_TIMEOUT_SECS}"
        ),
        _ => Ok(()),
    }
}

/// Values accepted by the `verbosity` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the tracing filter level for this setting.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Default config location: `$XDG_CONFIG_HOME/hget/config.toml`, falling
/// back to `$HOME/.config/hget/config.toml`.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("hget").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("hget")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads the config named by `--config`, or the default file if it exists.
///
/// An explicit path must exist; a missing default file is not an error.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file {}", path.display()))?;
    parse_config_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "program_folder" => {
                cfg.program_folder = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "segments" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.segments = Some(usize::try_from(parsed).with_context(invalid)?);
            }
            "copy_chunk_size" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.copy_chunk_size = Some(usize::try_from(parsed).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Drops a trailing `# comment`, ignoring `#` inside double quotes.
fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    let cut = line.find(|ch| {
        if ch == '"' {
            quoted = !quoted;
        }
        ch == '#' && !quoted
    });
    cut.map_or(line, |index| &line[..index])
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(ToString::to_string)
        .context("Expected a double-quoted string")
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.starts_with('-') {
        bail!("Expected a non-negative integer, got {token}");
    }
    token
        .parse::<u64>()
        .with_context(|| format!("Expected an integer, got '{token}'"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    Ok(match value {
        "default" => VerbositySetting::Default,
        "verbose" => VerbositySetting::Verbose,
        "quiet" => VerbositySetting::Quiet,
        "debug" => VerbositySetting::Debug,
        other => bail!("Unknown verbosity '{other}'; use default, verbose, quiet or debug"),
    })
}

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub program_folder: PathBuf,
    pub output_dir: PathBuf,
    pub engine: EngineConfig,
    pub timeout: Option<Duration>,
}

/// Applies precedence: CLI flag, then config file, then built-in default.
#[must_use]
pub fn resolve_runtime_settings(cli: &Cli, file: Option<&FileConfig>) -> RuntimeSettings {
    let file = file.cloned().unwrap_or_default();

    let program_folder = file.program_folder.unwrap_or_else(default_program_folder);
    let output_dir = cli
        .output_dir
        .clone()
        .or(file.output_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut engine = EngineConfig::default();
    engine.segments = cli
        .segments
        .map(usize::from)
        .or(file.segments)
        .unwrap_or_else(default_segments);
    if let Some(chunk) = file.copy_chunk_size {
        engine.copy_chunk_size = chunk;
    }
    if let Some(secs) = file.connect_timeout_secs {
        engine.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.read_timeout_secs {
        engine.read_timeout = Duration::from_secs(secs);
    }

    RuntimeSettings {
        program_folder,
        output_dir,
        engine,
        timeout: cli.timeout.map(Duration::from_secs),
    }
}

fn default_program_folder() -> PathBuf {
    env_var_non_empty_os("HOME").map_or_else(
        || PathBuf::from(DEFAULT_PROGRAM_FOLDER),
        |home| PathBuf::from(home).join(DEFAULT_PROGRAM_FOLDER),
    )
}

/// Picks the default log level when `RUST_LOG` is unset.
///
/// Priority: `-q`, then `-v`/`-vv`, then the config file, then `info`.
#[must_use]
pub fn resolve_default_log_level(cli: &Cli, file: Option<&FileConfig>) -> &'static str {
    if cli.quiet {
        "error"
    } else if cli.verbose > 0 {
        if cli.verbose == 1 { "debug" } else { "trace" }
    } else {
        file.and_then(|f| f.verbosity)
            .map_or("info", VerbositySetting::log_level)
    }
}
