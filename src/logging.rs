//! Tracing subscriber setup for the `alc` binary.
//!
//! The filter comes from `ALC_LOG` when set (standard `EnvFilter` syntax),
//! otherwise from the verbosity flag. Logs go to stderr so stdout stays
//! clean for command output, or to a file as JSON lines through a
//! non-blocking writer.

use std::fs::OpenOptions;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::{Error, Result};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "ALC_LOG";

/// Keeps the file writer flushing until dropped.
#[must_use = "logs written to a file are lost if the guard is dropped early"]
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Default filter directive for a `-v` count.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "alchemy_console=info,warn",
        1 => "alchemy_console=debug,info",
        _ => "trace",
    }
}

fn filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init(verbose: u8, log_file: Option<&Path>) -> Result<LogGuard> {
    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Other(format!("Failed to open log file {}: {}", path.display(), e)))?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        let _ = tracing_subscriber::registry()
            .with(filter(verbose))
            .with(layer)
            .try_init();

        tracing::debug!(path = %path.display(), "file logging initialized");
        return Ok(LogGuard {
            _guard: Some(guard),
        });
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(layer)
        .try_init();

    Ok(LogGuard { _guard: None })
}
