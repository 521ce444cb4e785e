//! Client error types.

use std::fmt;

use wfh_google::GoogleError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Authorization or Calendar API error.
    Google(GoogleError),
    /// IO error.
    Io(std::io::Error),
    /// No user name from flags, config or `$USER`.
    MissingUser,
}

impl ClientError {
    /// A suggestion printed after the error, when there is an obvious next step.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Google(err)
                if err.is_auth_failure()
                    || matches!(err, GoogleError::ReauthRequired(_) | GoogleError::Refresh(_)) =>
            {
                Some("run `wfh auth --force` to authorize again")
            }
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Google(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::MissingUser => write!(
                f,
                "unable to determine user, please set $USER or add user to config file"
            ),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Google(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<GoogleError> for ClientError {
    fn from(err: GoogleError) -> Self {
        Self::Google(err)
    }
}
