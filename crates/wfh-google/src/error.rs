//! Error types for the Google authorization flow and Calendar API calls.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// An error raised while authorizing against Google or calling the Calendar API.
#[derive(Debug, Error)]
pub enum GoogleError {
    /// No token file exists at the given path.
    #[error("no token file at {}", path.display())]
    NotFound { path: PathBuf },

    /// The token file exists but is not a well-formed token record.
    #[error("invalid token file {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Reading or writing a file failed.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local callback listener could not bind its port.
    #[error("cannot listen on {addr} for the OAuth redirect: {source}")]
    ListenerBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Callbacks arrived, but none carried the expected CSRF state.
    #[error("OAuth state mismatch - possible CSRF attack, no authorization code accepted")]
    StateMismatch,

    /// No callback arrived before the deadline.
    #[error("timed out after {}s waiting for the OAuth redirect", .0.as_secs())]
    CallbackTimeout(Duration),

    /// The wait for the callback was cancelled (e.g. Ctrl-C).
    #[error("authorization cancelled")]
    Cancelled,

    /// The user refused consent on the authorization page.
    #[error("authorization denied: {0}")]
    Denied(String),

    /// The token endpoint rejected the authorization code.
    #[error("unable to retrieve token from web: {0}")]
    Exchange(String),

    /// The access token expired and there is no refresh token.
    #[error("re-authorization required: {0}")]
    ReauthRequired(String),

    /// Refreshing the access token failed.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// The client credentials artifact is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure talking to Google.
    #[error("network error: {0}")]
    Network(String),

    /// The Calendar API answered with an error status.
    #[error("calendar API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The Calendar API answered with something we could not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Unexpected internal state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GoogleError {
    /// Builds an [`GoogleError::Io`] for the given action and path.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Returns true when a token load failure should lead to a fresh
    /// browser authorization rather than a failed run.
    pub fn requires_authorization(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Decode { .. } | Self::Io { .. } | Self::ReauthRequired(_)
        )
    }

    /// Returns true if the error came from an HTTP 401/403 answer.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

/// A specialized Result type for Google operations.
pub type GoogleResult<T> = Result<T, GoogleError>;
