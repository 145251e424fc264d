//! Core authlane library (session, refresh coordination, transport, config).

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod refresh;
pub mod session;
#[cfg(test)]
mod testutil;

pub use client::AuthenticatedClient;
pub use error::{AuthError, RefreshError, TransportError, TransportErrorKind};
pub use http::{ApiRequest, ApiResponse, Attempt};
pub use session::{AuthStatus, SessionStore, SessionTerminator};
