//! OAuth 2.0 authorization code flow with a loopback redirect.
//!
//! # Flow Overview
//!
//! 1. Try the token saved by a previous run
//! 2. Otherwise generate a CSRF state and a PKCE verifier/challenge
//! 3. Bind the local callback listener on the fixed redirect port
//! 4. Print (and optionally open) the authorization URL
//! 5. Wait for the redirect carrying `code` and the same `state`
//! 6. Stop the listener, exchange the code for a token, persist it
//!
//! The wait in step 5 has no deadline unless one is configured; it can
//! always be interrupted through a [`CancellationToken`].

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::callback::{CallbackListener, DEFAULT_CALLBACK_PORT};
use crate::client::AuthenticatedClient;
use crate::credentials::ClientConfig;
use crate::error::{GoogleError, GoogleResult};
use crate::tokens::{OAuthToken, TokenStore};

/// Length of the CSRF state, drawn from `[A-Za-z0-9]`.
pub const STATE_LENGTH: usize = 16;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Default timeout for requests to the token endpoint.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-attempt secrets: the CSRF state and the PKCE verifier.
///
/// Lives only in memory for one authorization attempt.
#[derive(Debug)]
pub struct AuthorizationRequest {
    state: String,
    verifier: String,
    challenge: String,
}

impl AuthorizationRequest {
    /// Creates a request with a fresh random state and verifier.
    pub fn new() -> Self {
        let verifier = Self::generate_verifier();
        let challenge = Self::compute_challenge(&verifier);
        Self {
            state: Self::generate_state(),
            verifier,
            challenge,
        }
    }

    /// The CSRF state embedded in the URL and expected back on the redirect.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// The PKCE verifier sent along with the code exchange.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    fn generate_state() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect()
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..CODE_VERIFIER_LENGTH).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the URL the user opens to grant access.
    pub fn authorization_url(
        &self,
        config: &ClientConfig,
        redirect_uri: &str,
    ) -> GoogleResult<String> {
        let mut url = Url::parse(&config.auth_endpoint).map_err(|e| {
            GoogleError::Configuration(format!(
                "invalid auth endpoint '{}': {}",
                config.auth_endpoint, e
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state);
        Ok(url.into())
    }
}

impl Default for AuthorizationRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from the token endpoint.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<i64>,
    #[serde(default)]
    pub(crate) token_type: Option<String>,
}

/// Client for the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client with the given configuration.
    pub fn new(config: ClientConfig, timeout: Duration) -> GoogleResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wfh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GoogleError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying HTTP client, shared with API callers.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Exchanges an authorization code for a token.
    ///
    /// `redirect_uri` must be the one used in the authorization URL.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> GoogleResult<OAuthToken> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .post_token_form(&params)
            .await
            .map_err(GoogleError::Exchange)?;

        info!("successfully obtained token");
        Ok(OAuthToken::new(
            response.access_token,
            response.token_type,
            response.refresh_token,
            response.expires_in,
        ))
    }

    /// Obtains a new access token using a refresh token.
    pub(crate) async fn refresh(&self, refresh_token: &str) -> GoogleResult<TokenResponse> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .post_token_form(&params)
            .await
            .map_err(GoogleError::Refresh)?;

        info!("successfully refreshed access token");
        Ok(response)
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(&self.config.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| format!("token request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response: {}", e))?;

        if !status.is_success() {
            return Err(format!("token endpoint returned {}: {}", status, body));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| format!("invalid token response: {}", e))?;
        if token.access_token.is_empty() {
            return Err("token response carries an empty access_token".to_string());
        }
        Ok(token)
    }
}

/// Knobs for the interactive part of the flow.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Local port of the redirect URI.
    pub port: u16,
    /// Upper bound on the wait for the redirect; `None` waits until cancelled.
    pub callback_timeout: Option<Duration>,
    /// Try to open the authorization URL in the default browser.
    pub open_browser: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_CALLBACK_PORT,
            callback_timeout: None,
            open_browser: true,
        }
    }
}

/// Produces a usable token, asking the user through the browser if needed.
#[derive(Debug)]
pub struct AuthorizationFlow {
    oauth: OAuthClient,
    store: TokenStore,
    settings: FlowSettings,
}

impl AuthorizationFlow {
    /// Creates a flow for the given client configuration and token file.
    pub fn new(config: ClientConfig, store: TokenStore) -> GoogleResult<Self> {
        config.validate()?;
        Ok(Self {
            oauth: OAuthClient::new(config, DEFAULT_HTTP_TIMEOUT)?,
            store,
            settings: FlowSettings::default(),
        })
    }

    /// Replaces the interactive settings.
    pub fn with_settings(mut self, settings: FlowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The token store used by this flow.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns the saved token, or runs the browser authorization when there
    /// is none (missing, unreadable or malformed file).
    ///
    /// A saved token is returned even if it is stale; renewal is the job of
    /// [`AuthenticatedClient`].
    pub async fn authenticate(&self, cancel: &CancellationToken) -> GoogleResult<OAuthToken> {
        match self.store.load() {
            Ok(token) => {
                if let Some(warning) = renewal_warning(&token) {
                    warn!("{}", warning);
                }
                debug!("using token from {}", self.store.path().display());
                Ok(token)
            }
            Err(e) if e.requires_authorization() => {
                match e {
                    GoogleError::NotFound { .. } => info!("{}", e),
                    _ => warn!("{}", e),
                }
                self.authorize(cancel).await
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the browser authorization unconditionally and saves the result.
    pub async fn authorize(&self, cancel: &CancellationToken) -> GoogleResult<OAuthToken> {
        let pending = self.start().await?;

        eprintln!(
            "\nGo to the following link in your browser:\n\n{}\n",
            pending.authorization_url()
        );
        if self.settings.open_browser {
            if let Err(e) = open::that(pending.authorization_url()) {
                warn!("failed to open browser: {}", e);
            }
        }

        pending.complete(cancel).await
    }

    /// Starts an authorization attempt: binds the listener and builds the URL.
    pub async fn start(&self) -> GoogleResult<PendingAuthorization<'_>> {
        let request = AuthorizationRequest::new();
        let listener = CallbackListener::bind(self.settings.port, request.state()).await?;
        let redirect_uri = listener.redirect_uri();
        let authorization_url = request.authorization_url(self.oauth.config(), &redirect_uri)?;
        debug!("authorization URL: {}", authorization_url);

        Ok(PendingAuthorization {
            flow: self,
            request,
            listener,
            redirect_uri,
            authorization_url,
        })
    }

    /// Authenticates and wraps the token in a client that renews it.
    pub async fn authenticated_client(
        &self,
        cancel: &CancellationToken,
    ) -> GoogleResult<AuthenticatedClient> {
        let token = self.authenticate(cancel).await?;
        Ok(AuthenticatedClient::new(
            self.oauth.clone(),
            self.store.clone(),
            token,
        ))
    }
}

/// An authorization attempt waiting for the browser redirect.
#[derive(Debug)]
pub struct PendingAuthorization<'a> {
    flow: &'a AuthorizationFlow,
    request: AuthorizationRequest,
    listener: CallbackListener,
    redirect_uri: String,
    authorization_url: String,
}

impl PendingAuthorization<'_> {
    /// The URL to open in the browser.
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// The redirect URI registered in the URL.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// The CSRF state the callback has to echo.
    pub fn state(&self) -> &str {
        self.request.state()
    }

    /// Waits for the code, stops the listener, exchanges and saves the token.
    pub async fn complete(mut self, cancel: &CancellationToken) -> GoogleResult<OAuthToken> {
        let code = self
            .listener
            .wait_for_code(cancel, self.flow.settings.callback_timeout)
            .await;
        self.listener.shutdown().await;
        let code = code?;

        info!("received authorization code, exchanging for token");
        let token = self
            .flow
            .oauth
            .exchange_code(&code, self.request.verifier(), &self.redirect_uri)
            .await?;
        self.flow.store.save(&token)?;
        Ok(token)
    }
}

/// Explains why a saved token will need a new authorization once it
/// expires. `None` when it carries a refresh token.
pub fn renewal_warning(token: &OAuthToken) -> Option<String> {
    if token.has_refresh_token() {
        return None;
    }
    let when = match token.expires_at() {
        Some(expiry) => format!("after {}", expiry.to_rfc3339()),
        None => "when the access token expires".to_string(),
    };
    Some(format!(
        "saved token has no refresh token; re-authorization will be required {}",
        when
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(token_endpoint: &str) -> ClientConfig {
        ClientConfig::new("test-client.apps.googleusercontent.com", "test-secret")
            .with_token_endpoint(token_endpoint)
    }

    fn query_of(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    fn flow(dir: &tempfile::TempDir, token_endpoint: &str) -> AuthorizationFlow {
        AuthorizationFlow::new(
            test_config(token_endpoint),
            TokenStore::new(dir.path().join(".wfh").join("token.json")),
        )
        .unwrap()
        .with_settings(FlowSettings {
            port: 0,
            callback_timeout: Some(Duration::from_secs(5)),
            open_browser: false,
        })
    }

    async fn token_endpoint(code: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("code={}", code)))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn state_is_alphanumeric_and_random() {
        let a = AuthorizationRequest::new();
        let b = AuthorizationRequest::new();
        assert_eq!(a.state().len(), STATE_LENGTH);
        assert!(a.state().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn pkce_verifier_and_challenge() {
        let request = AuthorizationRequest::new();
        // Base64 encoding of 32 bytes = 43 characters (no padding)
        assert_eq!(request.verifier().len(), 43);
        assert_eq!(
            AuthorizationRequest::compute_challenge("verifier"),
            AuthorizationRequest::compute_challenge("verifier")
        );
        assert_eq!(
            request.challenge,
            AuthorizationRequest::compute_challenge(request.verifier())
        );
    }

    #[test]
    fn auth_url_parameters() {
        let request = AuthorizationRequest::new();
        let config = test_config("https://oauth2.googleapis.com/token");
        let url = request
            .authorization_url(&config, "http://localhost:8066/")
            .unwrap();

        assert!(url.starts_with(crate::credentials::GOOGLE_AUTH_URL));
        let query = query_of(&url);
        assert_eq!(query["client_id"], "test-client.apps.googleusercontent.com");
        assert_eq!(query["redirect_uri"], "http://localhost:8066/");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["scope"], config.scopes.join(" "));
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["state"], request.state());
    }

    #[test]
    fn renewal_warning_only_without_refresh_token() {
        let with_refresh = OAuthToken::new("a", None, Some("r".to_string()), Some(3600));
        assert!(renewal_warning(&with_refresh).is_none());

        let without = OAuthToken::new("a", None, None, Some(3600));
        let warning = renewal_warning(&without).unwrap();
        assert!(warning.contains("no refresh token"));
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn saved_token_skips_web_authorization() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, "http://127.0.0.1:9/token");
        std::fs::create_dir_all(dir.path().join(".wfh")).unwrap();
        std::fs::write(
            flow.store().path(),
            r#"{"access_token":"abc","refresh_token":"","token_type":"Bearer","expiry":"2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let token = flow.authenticate(&cancel).await.unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_empty());

        let output = logs.contents();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("saved token has no refresh token"), "{output}");
    }

    #[tokio::test]
    async fn saved_token_with_refresh_token_loads_quietly() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, "http://127.0.0.1:9/token");
        let saved = OAuthToken::new("abc", None, Some("1//r".to_string()), Some(3600));
        flow.store().save(&saved).unwrap();

        let token = flow.authenticate(&CancellationToken::new()).await.unwrap();
        assert_eq!(token, saved);
        assert!(logs.contents().is_empty(), "{}", logs.contents());
    }

    #[tokio::test]
    async fn callback_code_is_exchanged_and_saved() {
        let server = token_endpoint("XYZ").await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, &format!("{}/token", server.uri()));

        let pending = flow.start().await.unwrap();
        let query = query_of(pending.authorization_url());
        assert_eq!(query["state"], pending.state());
        assert_eq!(query["redirect_uri"], pending.redirect_uri());

        let callback = format!("{}?code=XYZ&state={}", pending.redirect_uri(), pending.state());
        let browser = tokio::spawn(async move { reqwest::get(callback).await.unwrap().status() });

        let cancel = CancellationToken::new();
        let token = pending.complete(&cancel).await.unwrap();
        assert_eq!(browser.await.unwrap(), 200);
        assert_eq!(token.access_token, "ya29.fresh");
        assert_eq!(token.refresh_token, "1//refresh");
        assert_eq!(flow.store().load().unwrap(), token);
    }

    #[tokio::test]
    async fn exchange_uses_the_same_redirect_uri() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, &format!("{}/token", server.uri()));
        let pending = flow.start().await.unwrap();

        let encoded: String =
            url::form_urlencoded::byte_serialize(pending.redirect_uri().as_bytes()).collect();
        Mock::given(method("POST"))
            .and(body_string_contains(format!("redirect_uri={}", encoded)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let callback = format!("{}?code=C&state={}", pending.redirect_uri(), pending.state());
        tokio::spawn(async move { reqwest::get(callback).await });

        let cancel = CancellationToken::new();
        let token = pending.complete(&cancel).await.unwrap();
        assert!(token.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn rejected_code_is_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, &format!("{}/token", server.uri()));
        let pending = flow.start().await.unwrap();
        let callback = format!("{}?code=BAD&state={}", pending.redirect_uri(), pending.state());
        tokio::spawn(async move { reqwest::get(callback).await });

        let cancel = CancellationToken::new();
        let err = pending.complete(&cancel).await.unwrap_err();
        assert!(matches!(err, GoogleError::Exchange(ref m) if m.contains("invalid_grant")));
        assert!(matches!(
            flow.store().load(),
            Err(GoogleError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn mismatched_state_never_reaches_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, &format!("{}/token", server.uri())).with_settings(FlowSettings {
            port: 0,
            callback_timeout: Some(Duration::from_millis(300)),
            open_browser: false,
        });
        let pending = flow.start().await.unwrap();
        let callback = format!("{}?code=XYZ&state=WRONG", pending.redirect_uri());
        let status = reqwest::get(callback).await.unwrap().status();
        assert_eq!(status, 400);

        let cancel = CancellationToken::new();
        let err = pending.complete(&cancel).await.unwrap_err();
        assert!(matches!(err, GoogleError::StateMismatch));
    }

    #[tokio::test]
    async fn missing_token_starts_web_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow(&dir, "http://127.0.0.1:9/token");
        assert!(matches!(
            flow.store().load(),
            Err(GoogleError::NotFound { .. })
        ));

        // Cancelled while awaiting the callback: the handshake was started.
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = flow.authenticate(&cancel).await.unwrap_err();
        assert!(matches!(err, GoogleError::Cancelled));
    }
}
