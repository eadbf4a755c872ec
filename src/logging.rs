//! Logging setup
//!
//! The TUI owns the terminal, so it logs to a file under the cache
//! directory. CLI runs log to stderr, but only when asked (`--verbose` or
//! `RUST_LOG`), so scripted output stays clean.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,atvtui=debug";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log file used by the TUI (~/.cache/atvtui/atvtui.log)
pub fn log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("atvtui").join("atvtui.log"))
}

fn open_log(path: &PathBuf) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log to the TUI log file. Returns the path in use, if any.
pub fn init_tui() -> Option<PathBuf> {
    let path = log_path()?;
    let file = open_log(&path).ok()?;

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .try_init();
    Some(path)
}

/// Log to stderr when `verbose` is set or RUST_LOG is present
pub fn init_cli(verbose: bool) {
    if !verbose && std::env::var("RUST_LOG").is_err() {
        return;
    }

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(stderr_layer)
        .try_init();
}
