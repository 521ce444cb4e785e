//! Authorization command.

use tokio_util::sync::CancellationToken;
use tracing::info;
use wfh_google::{GoogleError, renewal_warning};

use crate::cli::AuthorizationArgs;
use crate::config::{Config, ConfigPaths};
use crate::error::ClientResult;

/// Runs the browser authorization unless a usable token is saved.
///
/// With `force`, the saved token is replaced regardless.
pub async fn run(
    force: bool,
    auth_args: &AuthorizationArgs,
    paths: &ConfigPaths,
    config: &Config,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let flow = super::authorization_flow(paths, config, auth_args)?;

    if !force {
        match flow.store().load() {
            Ok(token) => {
                println!("Already authorized with Google Calendar.");
                if let Some(warning) = renewal_warning(&token) {
                    println!("{}", warning);
                }
                println!("Use --force to authorize again.");
                return Ok(());
            }
            Err(e) if e.requires_authorization() => {
                if !matches!(e, GoogleError::NotFound { .. }) {
                    println!("{}", e);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Starting Google Calendar authorization...");
    flow.authorize(cancel).await?;

    info!("Google authorization successful");
    println!();
    println!("Authorization successful!");
    println!("Token saved to {}", flow.store().path().display());
    Ok(())
}
