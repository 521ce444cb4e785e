//! Google OAuth2 authorization and Calendar access for wfh.
//!
//! - [`TokenStore`] - loads/saves the OAuth token file
//! - [`AuthorizationFlow`] - returns the saved token or runs the browser
//!   handshake through a local [`CallbackListener`]
//! - [`AuthenticatedClient`] - attaches the bearer token and renews it
//! - [`CalendarClient`] - the Calendar API calls wfh makes
//!
//! # Architecture
//!
//! ```text
//!  token.json ──load──▶ AuthorizationFlow ──miss──▶ CallbackListener
//!       ▲                     │                        │ code
//!       └──────save───────────┤◀──── OAuthClient ◀─────┘
//!                             ▼        (exchange)
//!                   AuthenticatedClient ──▶ CalendarClient
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use wfh_google::{AuthorizationFlow, CalendarClient, ClientConfig, TokenStore};
//!
//! let config = ClientConfig::from_file("~/.wfh/credentials.json")?;
//! let flow = AuthorizationFlow::new(config, TokenStore::new("~/.wfh/token.json"))?;
//! let client = flow.authenticated_client(&CancellationToken::new()).await?;
//! let created = CalendarClient::new(client).insert_event("primary", &event).await?;
//! ```

pub mod calendar;
pub mod callback;
pub mod client;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod tokens;

pub use calendar::{CalendarClient, CalendarListEntry, CreatedEvent};
pub use callback::{CallbackListener, DEFAULT_CALLBACK_PORT, SHUTDOWN_GRACE};
pub use client::AuthenticatedClient;
pub use credentials::ClientConfig;
pub use error::{GoogleError, GoogleResult};
pub use oauth::{
    AuthorizationFlow, AuthorizationRequest, FlowSettings, OAuthClient, PendingAuthorization,
    renewal_warning,
};
pub use tokens::{OAuthToken, TokenStore};
