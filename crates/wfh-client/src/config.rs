//! Client configuration.
//!
//! Everything lives in one per-user directory, `~/.wfh` by default:
//!
//! - `credentials.json`: OAuth client credentials from the Google Cloud Console
//! - `token.json`: the OAuth token saved after authorization
//! - `config.json`: preferences ([`Config`])

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use wfh_core::DEFAULT_MESSAGE;
use wfh_google::{DEFAULT_CALLBACK_PORT, FlowSettings};

use crate::error::{ClientError, ClientResult};

/// Name of the configuration directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".wfh";

/// Locations of the files wfh reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    /// Uses `dir` as the configuration directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Uses the override when given, `~/.wfh` otherwise.
    pub fn resolve(dir: Option<PathBuf>) -> ClientResult<Self> {
        match dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Self::default_dir().map(Self::new),
        }
    }

    /// Returns the default configuration directory.
    ///
    /// # Errors
    ///
    /// Fails when the home directory cannot be determined.
    pub fn default_dir() -> ClientResult<PathBuf> {
        Self::dir_in_home(dirs::home_dir())
    }

    fn dir_in_home(home: Option<PathBuf>) -> ClientResult<PathBuf> {
        home.map(|home| home.join(CONFIG_DIR_NAME)).ok_or_else(|| {
            ClientError::Config(
                "unable to determine home directory, use --config-dir or WFH_CONFIG_DIR"
                    .to_string(),
            )
        })
    }

    /// The configuration directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// OAuth client credentials file.
    pub fn credentials_path(&self) -> PathBuf {
        self.dir.join("credentials.json")
    }

    /// OAuth token file.
    pub fn token_path(&self) -> PathBuf {
        self.dir.join("token.json")
    }

    /// Preferences file.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    /// Creates the configuration directory if it does not exist yet.
    pub fn ensure_dir(&self) -> ClientResult<()> {
        if !self.dir.is_dir() {
            debug!("creating config directory {}", self.dir.display());
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                ClientError::Config(format!(
                    "unable to create config directory {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// User preferences from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Calendar receiving the event.
    pub calendar_id: String,

    /// Event title template; `%s` is replaced by the user name.
    pub default_message: String,

    /// User name, overriding `$USER`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Local port of the OAuth redirect URI.
    pub callback_port: u16,

    /// Give up waiting for the OAuth redirect after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_timeout_secs: Option<u64>,

    /// Open the authorization URL in the default browser.
    pub open_browser: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calendar_id: "primary".to_string(),
            default_message: DEFAULT_MESSAGE.to_string(),
            user: None,
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_timeout_secs: None,
            open_browser: true,
        }
    }
}

impl Config {
    /// Loads preferences from `path`, using defaults if the file is absent.
    pub fn load(path: &Path) -> ClientResult<Self> {
        if !path.exists() {
            debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Settings for the browser authorization, with command line overrides.
    pub fn flow_settings(&self, timeout_secs: Option<u64>, no_browser: bool) -> FlowSettings {
        FlowSettings {
            port: self.callback_port,
            callback_timeout: timeout_secs
                .or(self.callback_timeout_secs)
                .map(Duration::from_secs),
            open_browser: self.open_browser && !no_browser,
        }
    }
}
