//! Subcommand implementations.

pub mod auth;
pub mod calendars;
pub mod config;
pub mod create;

use tokio_util::sync::CancellationToken;
use wfh_google::{AuthenticatedClient, AuthorizationFlow, ClientConfig, TokenStore};

use crate::cli::AuthorizationArgs;
use crate::config::{Config, ConfigPaths};
use crate::error::ClientResult;

/// Builds the authorization flow from the files in the config directory.
pub fn authorization_flow(
    paths: &ConfigPaths,
    config: &Config,
    args: &AuthorizationArgs,
) -> ClientResult<AuthorizationFlow> {
    let credentials = ClientConfig::from_file(paths.credentials_path())?;
    let flow = AuthorizationFlow::new(credentials, TokenStore::new(paths.token_path()))?
        .with_settings(config.flow_settings(args.timeout, args.no_browser));
    Ok(flow)
}

/// Returns a client for the saved token, authorizing first if needed.
pub async fn authenticated_client(
    paths: &ConfigPaths,
    config: &Config,
    args: &AuthorizationArgs,
    cancel: &CancellationToken,
) -> ClientResult<AuthenticatedClient> {
    let flow = authorization_flow(paths, config, args)?;
    Ok(flow.authenticated_client(cancel).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use wfh_google::GoogleError;

    #[test]
    fn missing_credentials_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(tmp.path());
        let err = authorization_flow(&paths, &Config::default(), &AuthorizationArgs::default())
            .unwrap_err();
        assert!(matches!(err, ClientError::Google(GoogleError::Configuration(_))));
        assert!(err.to_string().contains("unable to read client secret file"));
    }

    #[test]
    fn flow_uses_credentials_file() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(tmp.path());
        std::fs::write(
            paths.credentials_path(),
            r#"{"installed":{"client_id":"id.apps.googleusercontent.com","client_secret":"s"}}"#,
        )
        .unwrap();

        let flow =
            authorization_flow(&paths, &Config::default(), &AuthorizationArgs::default()).unwrap();
        assert_eq!(flow.store().path(), paths.token_path());
    }
}
