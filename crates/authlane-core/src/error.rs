//! Error types surfaced by the authenticated client.
//!
//! All errors are `Clone` because a single refresh outcome fans out to every
//! request waiting on it.

use std::fmt;

/// Categories of transport failures. HTTP statuses are never transport
/// failures; a 500 is a successful execution with a 500 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request could not be built (bad URL, invalid header, ...)
    InvalidRequest,
    /// Could not connect to the server
    Connect,
    /// Connection or request timeout
    Timeout,
    /// Failed while reading the response body
    Body,
    /// Anything else reported by the HTTP stack
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::InvalidRequest => write!(f, "invalid_request"),
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Body => write!(f, "body"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Network-level failure reported by a [`Transport`](crate::http::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_builder() || err.is_request() {
            TransportErrorKind::InvalidRequest
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// Why a refresh exchange did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-success status
    Rejected { status: u16, body: String },
    /// The refresh endpoint was unreachable
    Network(String),
    /// The refresh endpoint answered 2xx with an unusable body
    Parse(String),
    /// The refresh task stopped before settling
    Interrupted,
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshError::Rejected { status, body } if body.is_empty() => {
                write!(f, "refresh rejected (HTTP {status})")
            }
            RefreshError::Rejected { status, body } => {
                write!(f, "refresh rejected (HTTP {status}): {body}")
            }
            RefreshError::Network(msg) => write!(f, "refresh endpoint unreachable: {msg}"),
            RefreshError::Parse(msg) => write!(f, "invalid refresh response: {msg}"),
            RefreshError::Interrupted => write!(f, "refresh interrupted before completion"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors returned by [`AuthenticatedClient::send`](crate::AuthenticatedClient::send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No refresh token in the session store; no network call was made
    NoRefreshToken,
    /// The refresh endpoint rejected the refresh token or was unreachable
    RefreshFailed(RefreshError),
    /// The request was rejected again after its single replay
    AlreadyRetried,
    /// Non-authentication failure, passed through untouched
    Transport(TransportError),
}

impl AuthError {
    /// Returns true if the session was terminated before this error surfaced.
    pub fn is_session_ending(&self) -> bool {
        matches!(self, AuthError::NoRefreshToken | AuthError::RefreshFailed(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoRefreshToken => write!(f, "session has no refresh token"),
            AuthError::RefreshFailed(err) => write!(f, "token refresh failed: {err}"),
            AuthError::AlreadyRetried => {
                write!(f, "request unauthorized after token refresh")
            }
            AuthError::Transport(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::RefreshFailed(err) => Some(err),
            AuthError::Transport(err) => Some(err),
            AuthError::NoRefreshToken | AuthError::AlreadyRetried => None,
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        AuthError::Transport(err)
    }
}
