//! Configuration file parsing and structures.
//!
//! tinxyd reads a single TOML file with the platform credentials, the local
//! API listener, the accessory store location and logging levels.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,
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

    /// Per-target levels, e.g. `"tinxyd::tinxy" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter.
    ///
    /// `debug` raises the `tinxyd` target to DEBUG; explicit overrides still
    /// take precedence for their own targets.
    pub fn filter(&self, debug: bool) -> Targets {
        let mut targets = Targets::new().with_default(LevelFilter::from(self.level));
        if debug {
            targets = targets.with_target(env!("CARGO_CRATE_NAME"), LevelFilter::DEBUG);
        }
        for (target, level) in &self.overrides {
            targets = targets.with_target(target.clone(), LevelFilter::from(*level));
        }
        targets
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

fn default_api_base_url() -> String {
    "https://ha-backend.tinxy.in/v2/".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_discovery_interval_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Tinxy platform configuration
#[derive(Debug, Deserialize)]
pub struct PlatformConfig {
    /// Bearer token for the Tinxy backend. Without it the platform does not start.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Log platform activity at debug level
    #[serde(default)]
    pub debug: bool,

    /// Seconds between state polls of every accessory
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between device discovery passes
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            api_base_url: default_api_base_url(),
            debug: false,
            poll_interval_secs: default_poll_interval_secs(),
            discovery_interval_secs: default_discovery_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PlatformConfig {
    // Intervals are clamped to one second; tokio panics on a zero period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8581
}

fn default_true() -> bool {
    true
}

/// Local HTTP API the accessory host is exposed on
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_listen(),
            port: default_port(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/tinxyd")
}

/// Where the accessory store keeps its state
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
