//! HTTP client carrying a bearer token that renews itself.

use reqwest::{Method, RequestBuilder};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{GoogleError, GoogleResult};
use crate::oauth::OAuthClient;
use crate::tokens::{OAuthToken, TokenStore};

/// An HTTP client authorized with an OAuth token.
///
/// Every request gets the current access token. An expired access token is
/// renewed with the refresh token first, and the renewed token is written
/// back to the [`TokenStore`].
#[derive(Debug)]
pub struct AuthenticatedClient {
    oauth: OAuthClient,
    store: TokenStore,
    token: Mutex<OAuthToken>,
}

impl AuthenticatedClient {
    /// Wraps `token`, obtained from `store` or a fresh authorization.
    pub fn new(oauth: OAuthClient, store: TokenStore, token: OAuthToken) -> Self {
        Self {
            oauth,
            store,
            token: Mutex::new(token),
        }
    }

    /// Returns a valid access token, refreshing it if it has expired.
    ///
    /// # Errors
    ///
    /// [`GoogleError::ReauthRequired`] if the token expired and there is no
    /// refresh token; [`GoogleError::Refresh`] if the token endpoint refuses.
    pub async fn access_token(&self) -> GoogleResult<String> {
        let mut token = self.token.lock().await;
        if !token.is_expired() {
            return Ok(token.access_token.clone());
        }

        if !token.has_refresh_token() {
            return Err(GoogleError::ReauthRequired(format!(
                "access token expired and no refresh token is stored; delete {} and run again",
                self.store.path().display()
            )));
        }

        debug!("refreshing expired access token");
        let response = self.oauth.refresh(&token.refresh_token).await?;
        token.apply_refresh(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        );
        if let Some(token_type) = response.token_type {
            token.token_type = token_type;
        }

        if let Err(e) = self.store.save(&token) {
            warn!("refreshed token could not be saved: {}", e);
        }
        Ok(token.access_token.clone())
    }

    /// Starts a request with the bearer credential attached.
    pub async fn request(&self, method: Method, url: &str) -> GoogleResult<RequestBuilder> {
        let access_token = self.access_token().await?;
        Ok(self
            .oauth
            .http_client()
            .request(method, url)
            .bearer_auth(access_token))
    }

    /// Shorthand for a GET request.
    pub async fn get(&self, url: &str) -> GoogleResult<RequestBuilder> {
        self.request(Method::GET, url).await
    }

    /// Shorthand for a POST request.
    pub async fn post(&self, url: &str) -> GoogleResult<RequestBuilder> {
        self.request(Method::POST, url).await
    }
}
