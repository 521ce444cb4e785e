//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// wfh - Tell your team you are working from home today
///
/// Without a subcommand, creates an all-day event on your Google Calendar.
#[derive(Debug, Parser)]
#[command(name = "wfh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding credentials.json, token.json and config.json
    #[arg(long, env = "WFH_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub event: EventArgs,

    #[command(flatten)]
    pub authorization: AuthorizationArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Options for the event to create.
#[derive(Debug, Clone, Default, Args)]
pub struct EventArgs {
    /// Event title, `%s` is replaced by the user name
    #[arg(long, short)]
    pub message: Option<String>,

    /// User name (defaults to the config file, then $USER)
    #[arg(long, short)]
    pub user: Option<String>,

    /// Calendar to create the event on
    #[arg(long)]
    pub calendar_id: Option<String>,

    /// Day of the event (YYYY-MM-DD), today if omitted
    #[arg(long, short)]
    pub date: Option<NaiveDate>,

    /// Show the event without creating it
    #[arg(long)]
    pub dry_run: bool,
}

/// Options for the browser authorization.
#[derive(Debug, Clone, Default, Args)]
pub struct AuthorizationArgs {
    /// Do not open the authorization URL in a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Seconds to wait for the browser redirect
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize wfh to access Google Calendar
    Auth {
        /// Authorize again even if a token is saved
        #[arg(long, short)]
        force: bool,
    },

    /// List calendars the account can see
    Calendars,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file paths
    Path,
}
