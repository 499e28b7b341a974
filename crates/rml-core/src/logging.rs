//! Logging init: file under XDG state dir, or graceful fallback to stderr.
//!
//! Module code's `console.*` output is emitted under the `rml::module`
//! target, so the default filter keeps it visible alongside crate logs.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,rml_core=debug,rml=debug";

/// `RUST_LOG` when set, otherwise [`DEFAULT_FILTER`].
fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log file location under the XDG state dir, with parent dirs created.
fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rml")?;
    let dir = xdg_dirs.get_state_home().join("rml");
    fs::create_dir_all(&dir)?;
    Ok(dir.join("rml.log"))
}

/// Initialize structured logging to `~/.local/state/rml/rml.log`.
/// Returns Err when the state dir is unusable so the caller can fall back
/// to [`init_logging_stderr`].
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    tracing::info!("rml logging initialized at {}", path.display());
    Ok(())
}

/// Stderr-only init, for when the log file cannot be opened.
pub fn init_logging_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
