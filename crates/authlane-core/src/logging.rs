//! Tracing subscriber setup.
//!
//! Filter resolution: `AUTHLANE_LOG` if set, else the configured level.
//! Output goes to stderr unless `[log] file` names a file under the logs
//! directory; stdout is left to command output.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "AUTHLANE_LOG";

/// Builds the filter from `AUTHLANE_LOG`, falling back to `level`.
///
/// # Errors
/// Returns an error if the fallback directive is invalid.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {level}")),
    }
}

/// Installs the global subscriber.
///
/// Returns the worker guard when logging to a file; it must be held until
/// exit so buffered lines are flushed.
///
/// # Errors
/// Returns an error if the filter is invalid, the logs directory cannot be
/// created, or a subscriber is already installed.
pub fn init(config: &LogConfig, logs_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(&config.level)?;

    if let Some(file) = config.file.as_deref().filter(|f| !f.is_empty()) {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create {}", logs_dir.display()))?;
        let appender = tracing_appender::rolling::never(logs_dir, file);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(Some(guard));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(None)
}
