//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::error::{RefreshError, TransportError};
use crate::http::{ApiRequest, ApiResponse, StatusCode, Transport, TransportFuture};
use crate::refresh::{RefreshFuture, TokenGrant, TokenRefresher};
use crate::session::SessionTerminator;

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync;

/// In-memory transport that records every dispatched request.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    seen: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Answers 200 to `Bearer <token>` and 401 to anything else.
    pub fn accepting(token: &str) -> Arc<Self> {
        let token = token.to_string();
        Self::new(move |request| {
            if request.bearer_token() == Some(token.as_str()) {
                Ok(ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#))
            } else {
                Ok(ApiResponse::new(
                    StatusCode::UNAUTHORIZED,
                    r#"{"detail":"Given token not valid for any token type"}"#,
                ))
            }
        })
    }

    pub fn seen(&self) -> Vec<ApiRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        self.seen.lock().unwrap().push(request.clone());
        let result = (self.responder)(request);
        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }
}

/// Refresher whose single exchange completes when the test says so.
pub struct GatedRefresher {
    calls: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<Result<TokenGrant, RefreshError>>>>,
}

impl GatedRefresher {
    pub fn new() -> (Arc<Self>, oneshot::Sender<Result<TokenGrant, RefreshError>>) {
        let (tx, rx) = oneshot::channel();
        let refresher = Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(Some(rx)),
        });
        (refresher, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenRefresher for GatedRefresher {
    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> RefreshFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        Box::pin(async move {
            match gate {
                Some(rx) => rx.await.unwrap_or(Err(RefreshError::Interrupted)),
                None => Err(RefreshError::Rejected {
                    status: 500,
                    body: "gate already used".to_string(),
                }),
            }
        })
    }
}

/// Refresher that panics once the test releases it.
pub struct PanickingRefresher {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl PanickingRefresher {
    pub fn new() -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let refresher = Arc::new(Self {
            gate: Mutex::new(Some(rx)),
        });
        (refresher, tx)
    }
}

impl TokenRefresher for PanickingRefresher {
    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> RefreshFuture<'a> {
        let gate = self.gate.lock().unwrap().take();
        Box::pin(async move {
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            panic!("refresher blew up");
        })
    }
}

/// Refresher that always returns the same outcome.
pub struct FixedRefresher {
    calls: AtomicUsize,
    outcome: Result<TokenGrant, RefreshError>,
}

impl FixedRefresher {
    pub fn ok(grant: TokenGrant) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(grant),
        })
    }

    pub fn err(err: RefreshError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Err(err),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenRefresher for FixedRefresher {
    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> RefreshFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

#[derive(Default)]
pub struct CountingTerminator {
    calls: AtomicUsize,
}

impl CountingTerminator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionTerminator for CountingTerminator {
    fn terminate(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Yields to other tasks until `condition` holds.
///
/// # Panics
/// Panics if the condition does not hold after many scheduler turns.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
