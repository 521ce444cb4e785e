//! Configuration commands.

use crate::config::{Config, ConfigPaths};
use crate::error::{ClientError, ClientResult};

/// Dump the effective configuration to stdout.
pub fn dump(paths: &ConfigPaths, config: &Config) -> ClientResult<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("// config.json ({})", paths.config_path().display());
    println!("{}", json);
    Ok(())
}

/// Show where wfh reads and writes its files.
pub fn path(paths: &ConfigPaths) -> ClientResult<()> {
    println!("config:      {}", paths.config_path().display());
    println!("credentials: {}", paths.credentials_path().display());
    println!("token:       {}", paths.token_path().display());
    Ok(())
}
