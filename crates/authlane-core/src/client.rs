//! Authenticated API client.
//!
//! Every outgoing request is decorated with the stored access token. A 401
//! response hands the request to the [`RefreshCoordinator`], which refreshes
//! once and replays it; anything else is returned to the caller unchanged.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::Config;
use crate::error::AuthError;
use crate::http::{ApiRequest, ApiResponse, Attempt, HttpTransport, Transport, attach_bearer};
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
use crate::session::{ACCESS_TOKEN_KEY, SESSION_KEYS, SessionStore, SessionTerminator};

/// HTTP client that keeps its session alive across access token expiry.
///
/// Cheap to clone; clones share the session store and refresh state, so
/// concurrent requests from any clone take part in the same refresh.
#[derive(Clone)]
pub struct AuthenticatedClient {
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            refresher,
            terminator,
            Arc::clone(&transport),
        ));
        Self {
            store,
            transport,
            coordinator,
        }
    }

    /// Builds a client talking to the configured backend over HTTP.
    ///
    /// # Errors
    /// Returns an error if the configured URLs are invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn SessionStore>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        let base_url = config.base_url()?;
        let refresh_url = config.refresh_url()?;
        debug!(%base_url, %refresh_url, "building authenticated client");

        let transport = Arc::new(HttpTransport::new(http.clone(), base_url));
        let refresher = Arc::new(HttpTokenRefresher::new(http, refresh_url));
        Ok(Self::new(transport, store, refresher, terminator))
    }

    /// Sends `request` with the current access token.
    ///
    /// Non-401 responses, successful or not, are returned as-is. A 401 is
    /// recovered by a single refresh and one replay of the request.
    ///
    /// # Errors
    /// - [`AuthError::Transport`] if the request failed below HTTP
    /// - any error from [`RefreshCoordinator::handle_auth_failure`] when the
    ///   request was rejected with 401 and could not be recovered
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let token = self.store.get(ACCESS_TOKEN_KEY);
        let request = attach_bearer(request, token.as_deref());

        let response = self.transport.execute(&request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!(method = %request.method, path = %request.path, "request rejected with 401");
        self.coordinator
            .handle_auth_failure(request, Attempt::first())
            .await
    }

    /// Ends the session on the host's request.
    ///
    /// Clears the session keys directly; the terminator is reserved for
    /// failed recoveries.
    ///
    /// # Errors
    /// Returns an error if the store fails to persist the removal.
    pub fn logout(&self) -> Result<()> {
        self.store
            .clear(&SESSION_KEYS)
            .context("Failed to clear session")
    }

    pub fn is_refreshing(&self) -> bool {
        self.coordinator.is_refreshing()
    }

    pub fn waiter_count(&self) -> usize {
        self.coordinator.waiter_count()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}
