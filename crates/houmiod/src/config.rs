//! Configuration file parsing and structures.
//!
//! houmiod uses TOML. All intervals are in seconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing_subscriber::filter::{LevelFilter, Targets};

use crate::houmio::ConnectionSettings;
use crate::houmio::DEFAULT_HOST;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    pub houmio: HoumioConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"houmiod::houmio" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a tracing filter from the default level and the overrides.
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_heartbeat_interval() -> u64 {
    1800
}

fn default_reconnect_interval() -> u64 {
    3600
}

fn default_transition_interval() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    1
}

fn default_retry_delay() -> u64 {
    5
}

fn default_roster_timeout() -> u64 {
    10
}

/// Remote service configuration
#[derive(Debug, Deserialize)]
pub struct HoumioConfig {
    /// Site key selecting the installation to synchronize with
    pub site_key: String,

    /// Service base URL
    #[serde(default = "default_host")]
    pub host: String,

    /// Seconds between `clientReady` heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Seconds between forced reconnects, 0 disables them
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,

    /// Seconds between transition ticks
    #[serde(default = "default_transition_interval")]
    pub transition_interval: u64,

    /// Receive loop poll slice in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Seconds to wait after a failed connect
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Roster request timeout in seconds
    #[serde(default = "default_roster_timeout")]
    pub roster_timeout: u64,
}

impl HoumioConfig {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            site_key: self.site_key.clone(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval),
            reconnect_interval: match self.reconnect_interval {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            poll_interval: Duration::from_secs(self.poll_interval),
            retry_delay: Duration::from_secs(self.retry_delay),
        }
    }

    pub fn transition_interval(&self) -> Duration {
        Duration::from_secs(self.transition_interval)
    }

    pub fn roster_timeout(&self) -> Duration {
        Duration::from_secs(self.roster_timeout)
    }
}

/// HTTP API configuration
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let houmio = &self.houmio;
        if houmio.site_key.trim().is_empty() {
            return Err(ConfigError::Invalid("houmio.site_key is required".to_string()));
        }

        let intervals = [
            ("heartbeat_interval", houmio.heartbeat_interval),
            ("transition_interval", houmio.transition_interval),
            ("poll_interval", houmio.poll_interval),
            ("retry_delay", houmio.retry_delay),
            ("roster_timeout", houmio.roster_timeout),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "houmio.{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
