//! Session state: the key-value store holding credentials and the contract
//! used to end a session.

mod file;
mod memory;
pub mod terminator;

use anyhow::Result;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use terminator::{AuthStatus, SessionTerminator, StoreTerminator};

/// Key of the short-lived access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Key of the long-lived refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Key of the opaque identity label shown by the host.
pub const IDENTITY_KEY: &str = "identity";

/// Every key that identifies a session.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY];

/// Durable key-value holder for session credentials.
///
/// Reads never fail: implementations serve them from memory. Writes may fail
/// when persisting, but the in-memory value must already be updated by then.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    /// Returns an error if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// # Errors
    /// Returns an error if the removal could not be persisted.
    fn clear(&self, keys: &[&str]) -> Result<()>;
}

/// Snapshot of the credentials currently in a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub identity: Option<String>,
}

impl Credentials {
    pub fn load(store: &dyn SessionStore) -> Self {
        Self {
            access: store.get(ACCESS_TOKEN_KEY),
            refresh: store.get(REFRESH_TOKEN_KEY),
            identity: store.get(IDENTITY_KEY),
        }
    }

    /// Writes the credentials that are present. Absent fields are left alone.
    ///
    /// # Errors
    /// Returns an error if the store fails to persist a value.
    pub fn save(&self, store: &dyn SessionStore) -> Result<()> {
        for (key, value) in [
            (ACCESS_TOKEN_KEY, &self.access),
            (REFRESH_TOKEN_KEY, &self.refresh),
            (IDENTITY_KEY, &self.identity),
        ] {
            if let Some(value) = value {
                store.set(key, value)?;
            }
        }
        Ok(())
    }

    /// A session counts as authenticated while it holds an access token.
    pub fn is_authenticated(&self) -> bool {
        self.access.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Returns true if the store currently holds an access token.
pub fn is_authenticated(store: &dyn SessionStore) -> bool {
    Credentials::load(store).is_authenticated()
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= 16 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(12).collect();
    format!("{prefix}...")
}
