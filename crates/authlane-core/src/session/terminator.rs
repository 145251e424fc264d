//! Ending a session when credentials cannot be recovered.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use super::{SESSION_KEYS, SessionStore};

/// Authentication state as seen by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated,
    LoggedOut,
}

/// Destroys the session and tells the host to treat the user as logged out.
///
/// The client calls this at most once per failed recovery; it never
/// navigates anywhere itself.
pub trait SessionTerminator: Send + Sync {
    fn terminate(&self);
}

/// Clears the session keys from a store and publishes
/// [`AuthStatus::LoggedOut`] to every subscriber.
pub struct StoreTerminator {
    store: Arc<dyn SessionStore>,
    status: watch::Sender<AuthStatus>,
}

impl StoreTerminator {
    /// Creates a terminator and the receiver the host watches.
    ///
    /// The initial status reflects whether `store` holds an access token.
    pub fn new(store: Arc<dyn SessionStore>) -> (Self, watch::Receiver<AuthStatus>) {
        let initial = if super::is_authenticated(store.as_ref()) {
            AuthStatus::Authenticated
        } else {
            AuthStatus::LoggedOut
        };
        let (status, rx) = watch::channel(initial);
        (Self { store, status }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> AuthStatus {
        *self.status.borrow()
    }
}

impl SessionTerminator for StoreTerminator {
    fn terminate(&self) {
        if let Err(err) = self.store.clear(&SESSION_KEYS) {
            warn!(error = %format!("{err:#}"), "failed to clear session store");
        }
        self.status.send_replace(AuthStatus::LoggedOut);
        info!("session terminated");
    }
}
