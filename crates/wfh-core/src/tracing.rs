//! Tracing setup for wfh
//!
//! The binary calls [`init_tracing`] once before doing anything else:
//! ```ignore
//! use wfh_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli()).expect("failed to initialize tracing");
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to the wfh crates when RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include file/line information in logs
    pub include_location: bool,
    /// Whether to include target (module path) in logs
    pub include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            include_location: false,
            include_target: false,
        }
    }
}

impl TracingConfig {
    /// Config for a normal interactive run: only warnings from dependencies,
    /// informational messages from our own crates.
    #[must_use]
    pub fn cli() -> Self {
        Self::default()
    }

    /// Create a config suitable for CLI usage with debug mode
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_target: true,
        }
    }

    /// The directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        format!(
            "warn,wfh_core={level},wfh_google={level},wfh_client={level},wfh={level}",
            level = self.default_level
        )
    }
}

/// Initialize tracing with the given configuration.
///
/// Logs go to stderr in a compact single-line format without timestamps.
/// The `RUST_LOG` environment variable overrides the default level.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let layer = fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.default_level, Level::INFO);
        assert!(!config.include_location);
        assert!(!config.include_target);
    }

    #[test]
    fn test_cli_debug_config() {
        let config = TracingConfig::cli_debug();
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(config.include_location);
        assert!(config.default_directive().contains("wfh_client=DEBUG"));
    }

    #[test]
    fn test_default_directive_scopes_our_crates() {
        let directive = TracingConfig::cli().default_directive();
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("wfh_google=INFO"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }
}
