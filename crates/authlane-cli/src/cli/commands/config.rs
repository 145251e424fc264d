//! Config command handlers.

use anyhow::{Context, Result};
use authlane_core::config::{self, Config};

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

/// Prints the effective settings after env overrides.
pub fn show(config: &Config) -> Result<()> {
    println!("base_url:     {}", config.base_url()?);
    println!("refresh_url:  {}", config.refresh_url()?);
    match config.request_timeout() {
        Some(timeout) => println!("timeout:      {}s", timeout.as_secs()),
        None => println!("timeout:      disabled"),
    }
    println!("log level:    {}", config.log.level);
    if let Some(file) = &config.log.file {
        println!(
            "log file:     {}",
            config::paths::logs_dir().join(file).display()
        );
    }
    println!("session file: {}", config::paths::session_path().display());
    Ok(())
}
