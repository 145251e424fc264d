//! Request command handlers.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use authlane_core::config::{Config, paths};
use authlane_core::http::Method;
use authlane_core::session::{FileStore, StoreTerminator};
use authlane_core::{ApiRequest, ApiResponse, AuthStatus, AuthenticatedClient, SessionStore};
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::debug;

/// Message shown when a request ended the session.
const LOGGED_OUT_NOTICE: &str = "Session expired: logged out.";

/// Client bound to the on-disk session, plus the status it publishes.
struct SessionClient {
    client: AuthenticatedClient,
    status: watch::Receiver<AuthStatus>,
}

impl SessionClient {
    fn open(config: &Config) -> Result<Self> {
        let path = paths::session_path();
        let store: Arc<dyn SessionStore> = Arc::new(
            FileStore::open(&path)
                .with_context(|| format!("open session at {}", path.display()))?,
        );
        let (terminator, status) = StoreTerminator::new(Arc::clone(&store));
        let client = AuthenticatedClient::from_config(config, store, Arc::new(terminator))?;
        Ok(Self { client, status })
    }

    /// Tells the user when the session was terminated during this run.
    fn report_logout(&mut self) {
        if self.status.has_changed().unwrap_or(false)
            && *self.status.borrow_and_update() == AuthStatus::LoggedOut
        {
            eprintln!("{LOGGED_OUT_NOTICE}");
        }
    }
}

pub struct RequestOptions<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub data: Option<&'a str>,
    pub headers: &'a [String],
}

/// Builds an [`ApiRequest`] from command-line arguments.
fn build_request(opts: &RequestOptions<'_>) -> Result<ApiRequest> {
    let method = Method::from_bytes(opts.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method '{}'", opts.method))?;
    let mut request = ApiRequest::new(method, opts.path);

    for raw in opts.headers {
        let Some((name, value)) = raw.split_once(':') else {
            bail!("invalid header '{raw}', expected NAME:VALUE");
        };
        request.set_header(name.trim(), value.trim());
    }

    if let Some(data) = opts.data {
        let body: serde_json::Value = serde_json::from_str(data).context("parse --data as JSON")?;
        request = request.with_json(body);
    }

    Ok(request)
}

fn print_response(response: &ApiResponse) {
    println!("{}", response.status);
    let body = response.text();
    if !body.is_empty() {
        println!("{body}");
    }
}

pub async fn run(opts: RequestOptions<'_>, config: &Config) -> Result<()> {
    let request = build_request(&opts)?;
    debug!(method = %request.method, path = %request.path, "sending request");
    let mut session = SessionClient::open(config)?;

    let result = session.client.send(request).await;
    session.report_logout();

    let response = result?;
    print_response(&response);
    if !response.is_success() {
        bail!("Request failed with status {}", response.status);
    }
    Ok(())
}

/// Sends `count` concurrent GETs to `path` through one client.
pub async fn burst(path: &str, count: usize, config: &Config) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }
    let mut session = SessionClient::open(config)?;
    debug!(path, count, "sending burst");

    let sends = (0..count).map(|_| session.client.send(ApiRequest::get(path)));
    let results = join_all(sends).await;
    session.report_logout();

    let mut failed = 0;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(response) if response.is_success() => println!("#{} {}", i + 1, response.status),
            Ok(response) => {
                failed += 1;
                println!("#{} {}", i + 1, response.status);
            }
            Err(err) => {
                failed += 1;
                println!("#{} error: {err}", i + 1);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {count} requests failed");
    }
    Ok(())
}
