//! Refresh-token exchange against the token-refresh endpoint.
//!
//! Wire contract: POST `{"refresh": "<refresh_token>"}`, success body
//! `{"access": "<token>"}` plus `"refresh"` when the backend rotates refresh
//! tokens. Any non-success status is a failed refresh.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use url::Url;

use crate::error::RefreshError;

/// Future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = BoxFuture<'a, Result<TokenGrant, RefreshError>>;

/// Credentials minted by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access: String,
    /// Present only when the backend rotates refresh tokens
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Exchanges a refresh token for a new access token.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// [`TokenRefresher`] that talks to the refresh endpoint directly.
///
/// Uses a plain `reqwest::Client`: a refresh call never goes through the
/// authenticated client, so it cannot recurse into another refresh.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenRefresher {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await
            .map_err(|err| RefreshError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected { status, body });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|err| RefreshError::Parse(err.to_string()))?;

        if grant.access.is_empty() {
            return Err(RefreshError::Parse("empty access token".to_string()));
        }

        Ok(grant)
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
        Box::pin(self.exchange(refresh_token))
    }
}
