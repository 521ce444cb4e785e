//! OAuth client configuration.
//!
//! The client id, secret and endpoints come from the credentials JSON
//! downloaded from the Google Cloud Console (`~/.wfh/credentials.json`).
//! This crate only reads that file; it never writes it.

use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{GoogleError, GoogleResult};

/// Google's OAuth authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scope allowing events to be created on the user's calendars.
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

/// Scope allowing the user's calendar list to be read.
pub const CALENDAR_LIST_SCOPE: &str =
    "https://www.googleapis.com/auth/calendar.calendarlist.readonly";

/// OAuth 2.0 client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
    /// Where the user is sent to grant access.
    pub auth_endpoint: String,
    /// Where authorization codes and refresh tokens are exchanged.
    pub token_endpoint: String,
    /// Scopes requested during authorization.
    pub scopes: Vec<String>,
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Supports the Cloud Console format with an `installed` or `web` section, as
/// well as a flat format with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl ClientConfig {
    /// Creates a configuration against Google's endpoints with the default
    /// calendar scopes.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_endpoint: GOOGLE_AUTH_URL.to_string(),
            token_endpoint: GOOGLE_TOKEN_URL.to_string(),
            scopes: Self::default_scopes(),
        }
    }

    /// The scopes needed to book events and list calendars.
    pub fn default_scopes() -> Vec<String> {
        vec![
            CALENDAR_EVENTS_SCOPE.to_string(),
            CALENDAR_LIST_SCOPE.to_string(),
        ]
    }

    /// Loads the configuration from a Google Cloud Console credentials file.
    pub fn from_file(path: impl AsRef<Path>) -> GoogleResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GoogleError::Configuration(format!(
                "unable to read client secret file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses the configuration from a credentials JSON string.
    ///
    /// Endpoints missing from the file default to Google's.
    pub fn from_json(json: &str) -> GoogleResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            GoogleError::Configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        let (client_id, client_secret, auth_uri, token_uri) =
            if let Some(nested) = file.installed.or(file.web) {
                (
                    nested.client_id,
                    nested.client_secret,
                    nested.auth_uri,
                    nested.token_uri,
                )
            } else if let (Some(id), Some(secret)) = (file.client_id, file.client_secret) {
                (id, secret, file.auth_uri, file.token_uri)
            } else {
                return Err(GoogleError::Configuration(
                    "credentials file must contain 'installed'/'web' section or \
                     'client_id'/'client_secret' at root level"
                        .to_string(),
                ));
            };

        let mut config = Self::new(client_id, client_secret);
        if let Some(uri) = auth_uri {
            config.auth_endpoint = uri;
        }
        if let Some(uri) = token_uri {
            config.token_endpoint = uri;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Checks that the configuration can drive an authorization.
    pub fn validate(&self) -> GoogleResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(GoogleError::Configuration("client_id is required".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(GoogleError::Configuration(
                "client_secret is required".to_string(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(GoogleError::Configuration(
                "at least one OAuth scope is required".to_string(),
            ));
        }
        for (name, endpoint) in [
            ("auth_uri", &self.auth_endpoint),
            ("token_uri", &self.token_endpoint),
        ] {
            Url::parse(endpoint).map_err(|e| {
                GoogleError::Configuration(format!("invalid {} '{}': {}", name, endpoint, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_installed() {
        let json = r#"{
            "installed": {
                "client_id": "test-id.apps.googleusercontent.com",
                "project_id": "wfh-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(config.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(config.client_secret, "test-secret");
        assert_eq!(config.auth_endpoint, GOOGLE_AUTH_URL);
        assert_eq!(config.token_endpoint, GOOGLE_TOKEN_URL);
        assert_eq!(config.scopes, ClientConfig::default_scopes());
    }

    #[test]
    fn from_json_web_with_custom_endpoints() {
        let json = r#"{
            "web": {
                "client_id": "web-id",
                "client_secret": "web-secret",
                "auth_uri": "https://auth.example.com/authorize",
                "token_uri": "https://auth.example.com/token"
            }
        }"#;

        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(config.auth_endpoint, "https://auth.example.com/authorize");
        assert_eq!(config.token_endpoint, "https://auth.example.com/token");
    }

    #[test]
    fn from_json_flat() {
        let json = r#"{
            "client_id": "flat-id.apps.googleusercontent.com",
            "client_secret": "flat-secret"
        }"#;

        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(config.client_id, "flat-id.apps.googleusercontent.com");
        assert_eq!(config.token_endpoint, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn from_json_missing_section() {
        let err = ClientConfig::from_json(r#"{ "other": {} }"#).unwrap_err();
        assert!(matches!(err, GoogleError::Configuration(_)));
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn from_json_malformed() {
        let err = ClientConfig::from_json("not json").unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_file(dir.path().join("credentials.json")).unwrap_err();
        assert!(err.to_string().contains("unable to read client secret file"));
    }

    #[test]
    fn validation() {
        assert!(ClientConfig::new("id", "secret").validate().is_ok());
        assert!(ClientConfig::new("", "secret").validate().is_err());
        assert!(ClientConfig::new("id", " ").validate().is_err());
        assert!(
            ClientConfig {
                scopes: vec![],
                ..ClientConfig::new("id", "secret")
            }
            .validate()
            .is_err()
        );
        assert!(
            ClientConfig::new("id", "secret")
                .with_token_endpoint("not a url")
                .validate()
                .is_err()
        );
    }
}
