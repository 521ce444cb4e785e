//! Default action: create the work-from-home event.

use tokio_util::sync::CancellationToken;
use tracing::info;
use wfh_core::{WorkFromHomeEvent, render_summary, resolve_user};
use wfh_google::CalendarClient;

use crate::cli::{AuthorizationArgs, EventArgs};
use crate::config::{Config, ConfigPaths};
use crate::error::{ClientError, ClientResult};

/// Creates today's (or `--date`'s) event on the configured calendar.
pub async fn run(
    event_args: &EventArgs,
    auth_args: &AuthorizationArgs,
    paths: &ConfigPaths,
    config: &Config,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let env_user = std::env::var("USER").ok();
    let event = build_event(event_args, config, env_user.as_deref())?;
    let calendar_id = calendar_id(event_args, config);

    if event_args.dry_run {
        println!("Would create on {}: {}", calendar_id, event);
        return Ok(());
    }

    let client = super::authenticated_client(paths, config, auth_args, cancel).await?;
    let created = CalendarClient::new(client)
        .insert_event(calendar_id, &event)
        .await?;
    info!("created event {} on {}", created.id, calendar_id);

    println!("Event created: {}", event);
    if let Some(link) = created.html_link {
        println!("{}", link);
    }
    Ok(())
}

/// Builds the event from flags, the config file and `$USER`, in that order.
pub fn build_event(
    args: &EventArgs,
    config: &Config,
    env_user: Option<&str>,
) -> ClientResult<WorkFromHomeEvent> {
    let user = resolve_user([args.user.as_deref(), config.user.as_deref(), env_user])
        .ok_or(ClientError::MissingUser)?;
    let template = args.message.as_deref().unwrap_or(&config.default_message);
    let summary = render_summary(template, &user);

    Ok(match args.date {
        Some(date) => WorkFromHomeEvent::new(summary, date),
        None => WorkFromHomeEvent::today(summary),
    })
}

fn calendar_id<'a>(args: &'a EventArgs, config: &'a Config) -> &'a str {
    args.calendar_id.as_deref().unwrap_or(&config.calendar_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn march_15() -> EventArgs {
        EventArgs {
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            ..EventArgs::default()
        }
    }

    #[test]
    fn default_message_with_env_user() {
        let event = build_event(&march_15(), &Config::default(), Some("alice")).unwrap();
        assert_eq!(event.summary, "alice - working from home");
        assert_eq!(event.to_string(), "alice - working from home (2024-03-15)");
    }

    #[test]
    fn user_priority() {
        let config = Config {
            user: Some("config-user".to_string()),
            ..Config::default()
        };
        let event = build_event(&march_15(), &config, Some("env-user")).unwrap();
        assert_eq!(event.summary, "config-user - working from home");

        let args = EventArgs {
            user: Some("flag-user".to_string()),
            ..march_15()
        };
        let event = build_event(&args, &config, Some("env-user")).unwrap();
        assert_eq!(event.summary, "flag-user - working from home");
    }

    #[test]
    fn blank_config_user_falls_through() {
        let config = Config {
            user: Some("  ".to_string()),
            ..Config::default()
        };
        let event = build_event(&march_15(), &config, Some("bob")).unwrap();
        assert_eq!(event.summary, "bob - working from home");
    }

    #[test]
    fn missing_user_is_error() {
        let err = build_event(&march_15(), &Config::default(), None).unwrap_err();
        assert!(matches!(err, ClientError::MissingUser));
    }

    #[test]
    fn message_override() {
        let config = Config {
            default_message: "%s at home".to_string(),
            ..Config::default()
        };
        let event = build_event(&march_15(), &config, Some("alice")).unwrap();
        assert_eq!(event.summary, "alice at home");

        let args = EventArgs {
            message: Some("Remote: %s".to_string()),
            ..march_15()
        };
        let event = build_event(&args, &config, Some("alice")).unwrap();
        assert_eq!(event.summary, "Remote: alice");
    }

    #[test]
    fn calendar_id_override() {
        let config = Config::default();
        assert_eq!(calendar_id(&EventArgs::default(), &config), "primary");
        let args = EventArgs {
            calendar_id: Some("team@example.com".to_string()),
            ..EventArgs::default()
        };
        assert_eq!(calendar_id(&args, &config), "team@example.com");
    }

    #[tokio::test]
    async fn dry_run_needs_no_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(tmp.path());
        let args = EventArgs {
            user: Some("alice".to_string()),
            dry_run: true,
            ..march_15()
        };
        run(
            &args,
            &AuthorizationArgs::default(),
            &paths,
            &Config::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!paths.token_path().exists());
    }
}
