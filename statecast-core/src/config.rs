//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/statecast/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/statecast/` (~/.config/statecast/)
//! - Data: `$XDG_DATA_HOME/statecast/` (~/.local/share/statecast/)
//! - State/Logs: `$XDG_STATE_HOME/statecast/` (~/.local/state/statecast/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// State reporter configuration
    #[serde(default)]
    pub reporter: ReporterConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// State reporter configuration
///
/// Durations are in milliseconds so tests and tight embedding hosts can run
/// sub-second cadences. The defaults are the production cadence.
#[derive(Debug, Deserialize, Clone)]
pub struct ReporterConfig {
    /// Collector base URL (e.g., `https://presence.example.com`)
    pub server_url: Option<String>,

    /// Path of the state endpoint, appended to `server_url`
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Upper bound on a single HTTP exchange
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Steady-state heartbeat interval. Must stay well below the collector's
    /// "last seen" staleness timeout.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Heartbeat interval while an authorization attempt is in flight
    #[serde(default = "default_connecting_heartbeat_ms")]
    pub connecting_heartbeat_ms: u64,

    /// How long an authorization attempt counts as "in flight"
    #[serde(default = "default_connection_window_secs")]
    pub connection_window_secs: u64,

    /// Minimum spacing between two consecutive sends
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Panic on misuse (state set before initialization) instead of logging
    #[serde(default)]
    pub diagnostics: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            state_path: default_state_path(),
            request_timeout_ms: default_request_timeout_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            connecting_heartbeat_ms: default_connecting_heartbeat_ms(),
            connection_window_secs: default_connection_window_secs(),
            throttle_ms: default_throttle_ms(),
            diagnostics: false,
        }
    }
}

fn default_state_path() -> String {
    "/state".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_heartbeat_ms() -> u64 {
    60_000
}

fn default_connecting_heartbeat_ms() -> u64 {
    5_000
}

fn default_connection_window_secs() -> u64 {
    300
}

fn default_throttle_ms() -> u64 {
    1_000
}

impl ReporterConfig {
    /// Config pointing at `server_url` with default cadence
    pub fn for_server(server_url: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self
            .server_url
            .as_deref()
            .ok_or_else(|| Error::Config("reporter.server_url is required".to_string()))?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "reporter.server_url must be an http(s) URL, got {:?}",
                url
            )));
        }
        if !self.state_path.starts_with('/') {
            return Err(Error::Config(
                "reporter.state_path must start with '/'".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "reporter.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.throttle_ms == 0 {
            return Err(Error::Config(
                "reporter.throttle_ms must be positive".to_string(),
            ));
        }
        if self.heartbeat_ms == 0 || self.connecting_heartbeat_ms == 0 {
            return Err(Error::Config(
                "reporter heartbeat intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> Option<&str> {
        self.server_url.as_deref().map(|u| u.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn connecting_heartbeat(&self) -> Duration {
        Duration::from_millis(self.connecting_heartbeat_ms)
    }

    pub fn connection_window(&self) -> Duration {
        Duration::from_secs(self.connection_window_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/statecast/config.toml` (~/.config/statecast/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("statecast").join("config.toml")
    }

    /// Returns the data directory path (for the identity token)
    ///
    /// `$XDG_DATA_HOME/statecast/` (~/.local/share/statecast/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("statecast")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/statecast/` (~/.local/state/statecast/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("statecast")
    }

    /// Returns the token file path
    ///
    /// `$XDG_DATA_HOME/statecast/token.json`
    pub fn token_path() -> PathBuf {
        Self::data_dir().join("token.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/statecast/statecast.log` (~/.local/state/statecast/statecast.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("statecast.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
