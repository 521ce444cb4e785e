//! Calendar listing.

use tokio_util::sync::CancellationToken;
use wfh_google::{CalendarClient, CalendarListEntry};

use crate::cli::AuthorizationArgs;
use crate::config::{Config, ConfigPaths};
use crate::error::ClientResult;

/// Prints the calendars the account can see, one per line.
pub async fn run(
    auth_args: &AuthorizationArgs,
    paths: &ConfigPaths,
    config: &Config,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let client = super::authenticated_client(paths, config, auth_args, cancel).await?;
    let calendars = CalendarClient::new(client).list_calendars().await?;

    if calendars.is_empty() {
        println!("No calendars found.");
        return Ok(());
    }
    for calendar in &calendars {
        println!("{}", format_entry(calendar, &config.calendar_id));
    }
    Ok(())
}

/// `*` marks the configured calendar, `ro` calendars that refuse new events.
fn format_entry(calendar: &CalendarListEntry, configured: &str) -> String {
    let selected = calendar.id == configured || (calendar.primary && configured == "primary");
    format!(
        "{} {:<2} {} ({})",
        if selected { "*" } else { " " },
        if calendar.is_writable() { "" } else { "ro" },
        calendar.id,
        calendar.summary
    )
}
