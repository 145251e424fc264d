//! CLI entry and dispatch.

use anyhow::{Context, Result};
use authlane_core::config::{self, Config};
use authlane_core::logging;
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "authlane")]
#[command(version)]
#[command(about = "Session-keeping HTTP client for token-refreshing backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage the stored session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Send one authenticated request
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE, ...)
        #[arg(value_name = "METHOD")]
        method: String,

        /// Path relative to the base URL (e.g. library/)
        #[arg(value_name = "PATH")]
        path: String,

        /// JSON request body
        #[arg(short, long, value_name = "JSON")]
        data: Option<String>,

        /// Extra header, repeatable
        #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
    },

    /// Send concurrent GETs through one client
    Burst {
        /// Path relative to the base URL
        #[arg(value_name = "PATH")]
        path: String,

        /// Number of concurrent requests
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Show the effective configuration
    Show,
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Show the stored session (tokens masked)
    Show,
    /// Store session credentials
    Set {
        /// Access token
        #[arg(long, value_name = "TOKEN")]
        access: String,
        /// Refresh token
        #[arg(long, value_name = "TOKEN")]
        refresh: String,
        /// Identity label shown with the session
        #[arg(long, value_name = "NAME")]
        identity: Option<String>,
    },
    /// Remove the stored session
    Clear,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Show => commands::config::show(&load_config()?),
        },

        Commands::Session { command } => match command {
            SessionCommands::Show => commands::session::show(),
            SessionCommands::Set {
                access,
                refresh,
                identity,
            } => commands::session::set(access, refresh, identity),
            SessionCommands::Clear => commands::session::clear(),
        },

        Commands::Request {
            method,
            path,
            data,
            headers,
        } => {
            let config = load_config()?;
            let _log_guard = logging::init(&config.log, &config::paths::logs_dir())?;
            commands::request::run(
                commands::request::RequestOptions {
                    method: &method,
                    path: &path,
                    data: data.as_deref(),
                    headers: &headers,
                },
                &config,
            )
            .await
        }

        Commands::Burst { path, count } => {
            let config = load_config()?;
            let _log_guard = logging::init(&config.log, &config::paths::logs_dir())?;
            commands::request::burst(&path, count, &config).await
        }
    }
}

fn load_config() -> Result<Config> {
    Config::load().context("load config")
}
