//! OAuth token persistence.
//!
//! A single token record lives in a JSON file (by default
//! `~/.wfh/token.json`). The program never deletes it; removing the file by
//! hand forces a new browser authorization on the next run.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GoogleError, GoogleResult};

/// Access tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An OAuth2 token as stored on disk.
///
/// The field names match the token files written by other OAuth2 clients
/// (`access_token`, `token_type`, `refresh_token`, `expiry`), so an existing
/// `token.json` keeps working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Bearer credential for API requests.
    pub access_token: String,

    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: String,

    /// Long-lived credential used to renew the access token. May be empty.
    #[serde(default)]
    pub refresh_token: String,

    /// When the access token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Builds a token from a token-endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        token_type: Option<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: refresh_token.unwrap_or_default(),
            expiry: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    /// Returns true if a refresh token is available.
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// The effective expiry. A zero timestamp (`0001-01-01T00:00:00Z`) means
    /// the token never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|t| t.year() > 1)
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(expires_at) => Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= expires_at,
            None => false,
        }
    }

    /// Applies a refresh response. The refresh token is kept unless the
    /// server rotated it.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) {
        self.access_token = access_token.into();
        if let Some(refresh) = refresh_token.filter(|r| !r.is_empty()) {
            self.refresh_token = refresh;
        }
        self.expiry = expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs));
    }
}

/// File-backed store for a single [`OAuthToken`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store for the token file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and decodes the token file.
    ///
    /// # Errors
    ///
    /// - [`GoogleError::NotFound`] if the file does not exist
    /// - [`GoogleError::Decode`] if it is not a well-formed token record
    /// - [`GoogleError::Io`] for any other read failure
    pub fn load(&self) -> GoogleResult<OAuthToken> {
        debug!("loading token from {}", self.path.display());

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GoogleError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(GoogleError::io("failed to read token file", &self.path, e)),
        };

        let token: OAuthToken =
            serde_json::from_str(&content).map_err(|e| GoogleError::Decode {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if token.access_token.is_empty() {
            return Err(GoogleError::Decode {
                path: self.path.clone(),
                reason: "empty access_token".to_string(),
            });
        }

        Ok(token)
    }

    /// Writes the token, replacing any existing file.
    ///
    /// The content goes to a temporary file first and is renamed into place.
    /// On Unix the file is only readable by its owner.
    pub fn save(&self, token: &OAuthToken) -> GoogleResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| GoogleError::io("failed to create token directory", parent, e))?;
        }

        let content = serde_json::to_string_pretty(token)
            .map_err(|e| GoogleError::Internal(format!("failed to serialize token: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        let replaced = write_private(&temp_path, content.as_bytes())
            .map_err(|e| GoogleError::io("failed to write token file", &temp_path, e))
            .and_then(|()| {
                fs::rename(&temp_path, &self.path)
                    .map_err(|e| GoogleError::io("failed to replace token file", &self.path, e))
            });
        if let Err(e) = replaced {
            if let Err(cleanup) = fs::remove_file(&temp_path)
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!("failed to remove {}: {}", temp_path.display(), cleanup);
            }
            return Err(e);
        }

        info!("saved token to {}", self.path.display());
        Ok(())
    }
}

/// Writes `content` to a file only its owner can read, from creation on.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // mode() only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(content)?;
    file.sync_all()
}
