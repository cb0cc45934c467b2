//! Process configuration.
//!
//! Loaded from a YAML file, then overridden by environment variables named
//! after the key path (`server.listen_addr` -> `SERVER_LISTEN_ADDR`), then
//! validated. Durations are human-readable strings such as `"30s"` or
//! `"1m 30s"`; `"0s"` disables a timeout.
//!
//! # Example
//!
//! ```
//! use shared_publisher::config::Config;
//!
//! let config: Config = serde_yaml::from_str("server:\n  listen_addr: \":9000\"\n").unwrap();
//! config.validate().unwrap();
//! assert_eq!(config.server.listen_socket_addr().unwrap().port(), 9000);
//! assert_eq!(config.server.max_connections, 100);
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PublisherError, Result};
use crate::protocol::{ABSOLUTE_MAX_MESSAGE_SIZE, DEFAULT_MAX_MESSAGE_SIZE};
use crate::server::ServerConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub metrics: MetricsSettings,
    pub log: LogSettings,
    pub publisher: PublisherSettings,
}

/// TCP hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// `host:port`; a bare `:port` listens on all interfaces.
    pub listen_addr: String,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    pub max_message_size: usize,
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_connections: 100,
        }
    }
}

impl ServerSettings {
    /// Parse `listen_addr`, expanding `:port` to `0.0.0.0:port`.
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        let addr = self.listen_addr.trim();
        let expanded;
        let addr = if addr.starts_with(':') {
            expanded = format!("0.0.0.0{addr}");
            expanded.as_str()
        } else {
            addr
        };
        addr.parse().map_err(|e| {
            PublisherError::Config(format!(
                "server.listen_addr {:?} is not a socket address: {e}",
                self.listen_addr
            ))
        })
    }

    /// Runtime server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            listen_addr: self.listen_socket_addr()?,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            max_message_size: self.max_message_size,
            max_connections: self.max_connections,
        })
    }
}

/// Introspection HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8081,
            path: "/metrics".to_string(),
        }
    }
}

/// Log sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

impl std::str::FromStr for LogOutput {
    type Err = PublisherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "file" => Ok(Self::File),
            other => Err(PublisherError::Config(format!(
                "log.output must be stdout, stderr or file, got {other:?}"
            ))),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, usually a bare level.
    pub level: String,
    /// Human-readable output instead of JSON lines.
    pub pretty: bool,
    pub output: LogOutput,
    /// Required when `output` is `file`.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            pretty: false,
            output: LogOutput::Stdout,
            file: None,
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Period of the statistics reporter.
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Read `path`, apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, an override cannot be
    /// parsed, or the result does not pass [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PublisherError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let mut config = Self::from_yaml(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without overrides or validation. An empty document yields the defaults.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply overrides from `lookup`, keyed by upper-case environment names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SERVER_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("SERVER_READ_TIMEOUT") {
            self.server.read_timeout = parse_duration("SERVER_READ_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SERVER_WRITE_TIMEOUT") {
            self.server.write_timeout = parse_duration("SERVER_WRITE_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SERVER_MAX_MESSAGE_SIZE") {
            self.server.max_message_size = parse_value("SERVER_MAX_MESSAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("SERVER_MAX_CONNECTIONS") {
            self.server.max_connections = parse_value("SERVER_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("METRICS_ENABLED") {
            self.metrics.enabled = parse_value("METRICS_ENABLED", &v)?;
        }
        if let Some(v) = lookup("METRICS_PORT") {
            self.metrics.port = parse_value("METRICS_PORT", &v)?;
        }
        if let Some(v) = lookup("METRICS_PATH") {
            self.metrics.path = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("LOG_PRETTY") {
            self.log.pretty = parse_value("LOG_PRETTY", &v)?;
        }
        if let Some(v) = lookup("LOG_OUTPUT") {
            self.log.output = v.parse()?;
        }
        if let Some(v) = lookup("LOG_FILE") {
            self.log.file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PUBLISHER_STATS_INTERVAL") {
            self.publisher.stats_interval = parse_duration("PUBLISHER_STATS_INTERVAL", &v)?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_message_size == 0 {
            return Err(PublisherError::Config(
                "server.max_message_size must be positive".into(),
            ));
        }
        if self.server.max_message_size > ABSOLUTE_MAX_MESSAGE_SIZE {
            return Err(PublisherError::Config(
                "server.max_message_size must fit the 4-byte length prefix".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(PublisherError::Config(
                "server.max_connections must be positive".into(),
            ));
        }
        self.server.listen_socket_addr()?;

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(PublisherError::Config(
                    "metrics.port must be positive when metrics enabled".into(),
                ));
            }
            if !self.metrics.path.starts_with('/') {
                return Err(PublisherError::Config(
                    "metrics.path must start with '/'".into(),
                ));
            }
        }

        if self.log.output == LogOutput::File && self.log.file.is_none() {
            return Err(PublisherError::Config(
                "log.file is required when log.output is file".into(),
            ));
        }

        if self.publisher.stats_interval.is_zero() {
            return Err(PublisherError::Config(
                "publisher.stats_interval must be positive".into(),
            ));
        }

        Ok(())
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| PublisherError::Config(format!("{key}: invalid duration {value:?}: {e}")))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PublisherError::Config(format!("{key}: invalid value {value:?}: {e}")))
}

/// Serde adapter for human-readable durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }
}
