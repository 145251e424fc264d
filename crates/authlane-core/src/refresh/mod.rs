//! Single-flight access token refresh.
//!
//! However many requests are rejected with 401 at the same time, one refresh
//! exchange runs and every rejected request resumes with its outcome:
//!
//! - the first rejection that finds no refresh in flight becomes the leader
//!   and starts the exchange on a spawned task;
//! - rejections that arrive while it runs are queued as waiters;
//! - on success every waiter is replayed with the new token in arrival
//!   order, then the leader replays its own request;
//! - on failure the session is terminated once and every request fails.
//!
//! The in-flight slot is checked and claimed inside one critical section
//! with no `.await` in it, so two rejections can never both start a refresh.

mod exchange;

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub use exchange::{HttpTokenRefresher, RefreshFuture, TokenGrant, TokenRefresher};
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{AuthError, RefreshError};
use crate::http::{ApiRequest, ApiResponse, Attempt, Transport, attach_bearer};
use crate::session::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SessionStore, SessionTerminator};

type Reply = Result<ApiResponse, AuthError>;

/// State of one refresh attempt. Exists only while the attempt is in flight.
struct RefreshState {
    started: Instant,
    waiters: VecDeque<PendingRequest>,
}

/// A request parked until the in-flight refresh settles.
struct PendingRequest {
    request: ApiRequest,
    attempt: Attempt,
    reply: oneshot::Sender<Reply>,
}

/// What a rejected request does after claiming the refresh slot.
enum Role {
    /// Runs the exchange.
    Leader,
    /// Waits for the leader's outcome.
    Waiter(oneshot::Receiver<Reply>),
    /// A refresh settled after this request was dispatched; replay with the
    /// token it stored.
    Rotated(String),
}

/// Owns the refresh protocol for one client.
pub struct RefreshCoordinator {
    state: Mutex<Option<RefreshState>>,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    terminator: Arc<dyn SessionTerminator>,
    transport: Arc<dyn Transport>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        terminator: Arc<dyn SessionTerminator>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            state: Mutex::new(None),
            store,
            refresher,
            terminator,
            transport,
        }
    }

    /// Returns true while a refresh exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().is_some()
    }

    /// Number of requests parked on the in-flight refresh whose callers are
    /// still waiting.
    pub fn waiter_count(&self) -> usize {
        self.lock_state().as_ref().map_or(0, |state| {
            state
                .waiters
                .iter()
                .filter(|pending| !pending.reply.is_closed())
                .count()
        })
    }

    /// Recovers a request that was rejected with 401.
    ///
    /// `request` is the request as it was dispatched (carrying the token it
    /// was rejected with).
    ///
    /// # Errors
    /// - [`AuthError::AlreadyRetried`] if `attempt` was already replayed once
    /// - [`AuthError::NoRefreshToken`] if the session has no refresh token
    /// - [`AuthError::RefreshFailed`] if the refresh exchange failed
    /// - [`AuthError::Transport`] if the replay failed below HTTP
    pub async fn handle_auth_failure(
        self: &Arc<Self>,
        request: ApiRequest,
        attempt: Attempt,
    ) -> Result<ApiResponse, AuthError> {
        if !attempt.is_retry_eligible() {
            debug!(path = %request.path, "rejected after replay, not retrying");
            return Err(AuthError::AlreadyRetried);
        }
        let attempt = attempt.mark_retried();

        let Some(refresh_token) = self.store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
        else {
            warn!(path = %request.path, "no refresh token, terminating session");
            self.terminator.terminate();
            return Err(AuthError::NoRefreshToken);
        };

        match self.claim(&request, attempt) {
            Role::Waiter(rx) => match rx.await {
                Ok(reply) => reply,
                Err(_) => Err(AuthError::RefreshFailed(RefreshError::Interrupted)),
            },
            Role::Rotated(token) => replay(self.transport.as_ref(), request, attempt, &token).await,
            Role::Leader => {
                // The exchange runs detached so that dropping this caller
                // does not strand the waiters.
                let coordinator = Arc::clone(self);
                let settlement =
                    tokio::spawn(async move { coordinator.run_refresh(refresh_token).await });
                let token = match settlement.await {
                    Ok(outcome) => outcome?,
                    Err(_) => return Err(AuthError::RefreshFailed(RefreshError::Interrupted)),
                };
                replay(self.transport.as_ref(), request, attempt, &token).await
            }
        }
    }

    fn claim(&self, request: &ApiRequest, attempt: Attempt) -> Role {
        let mut slot = self.lock_state();

        if let Some(state) = slot.as_mut() {
            let (reply, rx) = oneshot::channel();
            state.waiters.push_back(PendingRequest {
                request: request.clone(),
                attempt,
                reply,
            });
            debug!(
                path = %request.path,
                waiters = state.waiters.len(),
                "refresh in flight, request queued"
            );
            return Role::Waiter(rx);
        }

        if let Some(current) = self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
            && request.bearer_token() != Some(current.as_str())
        {
            debug!(path = %request.path, "access token rotated since dispatch");
            return Role::Rotated(current);
        }

        *slot = Some(RefreshState {
            started: Instant::now(),
            waiters: VecDeque::new(),
        });
        Role::Leader
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String) -> Result<String, AuthError> {
        let mut guard = InFlightGuard {
            coordinator: Some(&self),
        };
        info!("refreshing access token");
        let outcome = AssertUnwindSafe(self.refresher.refresh(&refresh_token))
            .catch_unwind()
            .await;
        guard.disarm();

        match outcome {
            Ok(Ok(grant)) => Ok(self.settle_success(grant)),
            Ok(Err(err)) => Err(self.settle_failure(err)),
            Err(_) => {
                warn!("token refresher panicked");
                Err(self.settle_failure(RefreshError::Interrupted))
            }
        }
    }

    fn settle_success(&self, grant: TokenGrant) -> String {
        if let Err(err) = self.store.set(ACCESS_TOKEN_KEY, &grant.access) {
            warn!(error = %format!("{err:#}"), "failed to persist access token");
        }
        if let Some(refresh) = grant.refresh.as_deref()
            && let Err(err) = self.store.set(REFRESH_TOKEN_KEY, refresh)
        {
            warn!(error = %format!("{err:#}"), "failed to persist rotated refresh token");
        }

        let Some(state) = self.lock_state().take() else {
            return grant.access;
        };
        info!(
            waiters = state.waiters.len(),
            elapsed_ms = state.started.elapsed().as_millis() as u64,
            "access token refreshed"
        );

        for pending in state.waiters {
            let PendingRequest {
                request,
                attempt,
                reply,
            } = pending;
            if reply.is_closed() {
                debug!(path = %request.path, "waiter went away, skipping replay");
                continue;
            }
            let transport = Arc::clone(&self.transport);
            let token = grant.access.clone();
            tokio::spawn(async move {
                let result = replay(transport.as_ref(), request, attempt, &token).await;
                let _ = reply.send(result);
            });
        }

        grant.access
    }

    fn settle_failure(&self, err: RefreshError) -> AuthError {
        warn!(error = %err, "token refresh failed, terminating session");
        self.terminator.terminate();

        if let Some(state) = self.lock_state().take() {
            for pending in state.waiters {
                let _ = pending
                    .reply
                    .send(Err(AuthError::RefreshFailed(err.clone())));
            }
        }

        AuthError::RefreshFailed(err)
    }

    /// Clears the slot after the exchange was dropped mid-flight (task
    /// cancelled or runtime shut down). The session is kept.
    fn abandon(&self) {
        let Some(state) = self.lock_state().take() else {
            return;
        };
        warn!(
            waiters = state.waiters.len(),
            "token refresh abandoned before completion"
        );
        for pending in state.waiters {
            let _ = pending
                .reply
                .send(Err(AuthError::RefreshFailed(RefreshError::Interrupted)));
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<RefreshState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight slot if the exchange future is dropped before it
/// returns.
struct InFlightGuard<'a> {
    coordinator: Option<&'a RefreshCoordinator>,
}

impl InFlightGuard<'_> {
    fn disarm(&mut self) {
        self.coordinator = None;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.abandon();
        }
    }
}

/// Re-decorates `request` with `token` and dispatches it once more.
async fn replay(
    transport: &dyn Transport,
    request: ApiRequest,
    attempt: Attempt,
    token: &str,
) -> Result<ApiResponse, AuthError> {
    let request = attach_bearer(request, Some(token));
    let response = transport.execute(&request).await?;
    if response.is_unauthorized() && !attempt.is_retry_eligible() {
        debug!(path = %request.path, "replay rejected again");
        return Err(AuthError::AlreadyRetried);
    }
    Ok(response)
}
