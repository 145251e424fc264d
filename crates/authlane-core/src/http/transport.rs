//! Raw request execution.

use futures_util::future::BoxFuture;
use url::Url;

use super::{ApiRequest, ApiResponse};
use crate::error::TransportError;

/// Future returned by [`Transport::execute`].
pub type TransportFuture<'a> = BoxFuture<'a, Result<ApiResponse, TransportError>>;

/// Executes requests without any credential handling.
///
/// Every HTTP status is a successful execution; errors are reserved for
/// failures below HTTP (connect, timeout, malformed request, body read).
pub trait Transport: Send + Sync {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a>;
}

/// Resolves `path` against `base`, joining the way an API base URL is
/// expected to: `http://host/api/` + `/games/` -> `http://host/api/games/`.
///
/// # Errors
/// Returns an error if the joined URL is not valid.
pub fn join_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    base.join(path.trim_start_matches('/'))
}

/// Ensures the base URL ends with `/` so relative joins append to it.
pub fn normalize_base_url(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = join_url(&self.base_url, &request.path).map_err(|err| {
            TransportError::invalid_request(format!("invalid path '{}': {err}", request.path))
        })?;

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(self.send(request))
    }
}
