//! Logging: `rfp.log` under the XDG state dir, or stderr when that is unusable.
//!
//! `RFP_LOG` takes precedence over `RUST_LOG`; with neither set,
//! [`DEFAULT_FILTER`] applies. Scheduler and transfer events carry
//! `task_id` / `transfer_id` / `worker` fields, so one file is enough to follow
//! a transfer across the pool.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Filter used when neither [`FILTER_ENV`] nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info,rfp=debug,rfp_core=debug";

/// Environment variable holding an rfp-specific filter directive.
pub const FILTER_ENV: &str = "RFP_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/rfp/rfp.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rfp")?;
    Ok(xdg_dirs.get_state_home().join("rfp.log"))
}

/// Opens `path` for appending, creating missing parent directories.
fn open_log(path: &Path) -> Result<fs::File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

/// Logs to [`log_path`] and returns it.
/// Returns Err (e.g. state dir unwritable) so the caller can fall back to stderr.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_path()?;
    init_logging_at(&path)?;
    Ok(path)
}

/// Logs to `path`. Fails if the file cannot be opened or a global subscriber
/// is already installed.
pub fn init_logging_at(path: &Path) -> Result<()> {
    let file = open_log(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    tracing::info!(log = %path.display(), "rfp logging initialized");
    Ok(())
}

/// Logs to stderr only. Use when [`init_logging`] fails.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
