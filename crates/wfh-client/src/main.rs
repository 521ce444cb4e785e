//! wfh CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use wfh_client::cli::{Cli, Command, ConfigAction};
use wfh_client::commands;
use wfh_client::config::{Config, ConfigPaths};
use wfh_client::error::{ClientError, ClientResult};
use wfh_core::{TracingConfig, init_tracing};
use wfh_google::{GoogleError, SHUTDOWN_GRACE};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted");
            interrupt.cancel();
        }
    });

    let task = run(cli, &cancel);
    tokio::pin!(task);

    // The handshake watches the token itself; anything else gets a short
    // grace period before being dropped.
    let result = tokio::select! {
        result = &mut task => result,
        _ = cancel.cancelled() => {
            tokio::time::timeout(SHUTDOWN_GRACE, &mut task)
                .await
                .unwrap_or(Err(ClientError::Google(GoogleError::Cancelled)))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> ClientResult<()> {
    let paths = ConfigPaths::resolve(cli.config_dir)?;
    paths.ensure_dir()?;
    let config = Config::load(&paths.config_path())?;
    debug!("using config directory {}", paths.dir().display());

    match cli.command {
        Some(Command::Auth { force }) => {
            commands::auth::run(force, &cli.authorization, &paths, &config, cancel).await
        }
        Some(Command::Calendars) => {
            commands::calendars::run(&cli.authorization, &paths, &config, cancel).await
        }
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&paths, &config),
            ConfigAction::Path => commands::config::path(&paths),
        },
        None => {
            commands::create::run(&cli.event, &cli.authorization, &paths, &config, cancel).await
        }
    }
}
