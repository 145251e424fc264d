//! Configuration management for authlane.
//!
//! Loads configuration from ${AUTHLANE_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::transport::{join_url, normalize_base_url};

/// Environment variable overriding `base_url`.
pub const BASE_URL_ENV: &str = "AUTHLANE_BASE_URL";

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for authlane configuration and data files.
    //!
    //! AUTHLANE_HOME resolution order:
    //! 1. AUTHLANE_HOME environment variable (if set)
    //! 2. ~/.config/authlane (default)

    use std::path::PathBuf;

    /// Returns the authlane home directory.
    pub fn authlane_home() -> PathBuf {
        if let Ok(home) = std::env::var("AUTHLANE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".authlane"),
            |h| h.join(".config").join("authlane"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        authlane_home().join("config.toml")
    }

    /// Returns the path to the persisted session.
    pub fn session_path() -> PathBuf {
        authlane_home().join("session.json")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        authlane_home().join("logs")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "authlane_core=debug"
    pub level: String,
    /// File name under the logs directory; stderr when unset
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL request paths are resolved against
    pub base_url: String,

    /// Token refresh endpoint, relative to `base_url`
    pub refresh_path: String,

    /// Per-request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            refresh_path: Self::DEFAULT_REFRESH_PATH.to_string(),
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
    const DEFAULT_REFRESH_PATH: &str = "token/refresh/";
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the default config template to `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Returns the effective base URL (env > config > default).
    ///
    /// # Errors
    /// Returns an error if the selected URL is invalid.
    pub fn base_url(&self) -> Result<Url> {
        let env_value = std::env::var(BASE_URL_ENV).ok();
        resolve_base_url(env_value.as_deref(), &self.base_url)
    }

    /// Returns the absolute URL of the token refresh endpoint.
    ///
    /// # Errors
    /// Returns an error if the base URL or refresh path is invalid.
    pub fn refresh_url(&self) -> Result<Url> {
        let base = self.base_url()?;
        join_url(&base, &self.refresh_path)
            .with_context(|| format!("Invalid refresh_path: {}", self.refresh_path))
    }

    /// Returns the request timeout, or `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Resolves the base URL with precedence: env > config > default.
///
/// Blank values are skipped. The result always ends with `/`.
///
/// # Errors
/// Returns an error if the chosen value is not a valid URL.
pub fn resolve_base_url(env_value: Option<&str>, config_value: &str) -> Result<Url> {
    let chosen = [env_value.unwrap_or_default(), config_value]
        .into_iter()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(Config::DEFAULT_BASE_URL);

    let url = Url::parse(chosen).with_context(|| format!("Invalid base URL: {chosen}"))?;
    Ok(normalize_base_url(url))
}
