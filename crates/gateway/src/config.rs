//! Configuration management for the podterm gateway.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/podterm/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("listen_addr must be a socket address like 127.0.0.1:9090, got {0}")]
    InvalidListenAddr(String),

    #[error("bind_timeout_secs must be between 1 and 86400 seconds, got {0}")]
    InvalidBindTimeout(u64),

    #[error("max_sessions must be between 1 and 10000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("{name} must be between 1 and 4096, got {value}")]
    InvalidQueueCapacity { name: &'static str, value: usize },

    #[error("max_message_bytes must be greater than 0, got {0}")]
    InvalidMaxMessageBytes(usize),

    #[error("kubectl binary must not be empty")]
    EmptyKubectlBinary,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for the channel capacities.
const MAX_QUEUE_CAPACITY: usize = 4096;

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Terminal session configuration.
    pub session: SessionConfig,

    /// Remote exec transport configuration.
    pub kubectl: KubectlConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen_addr: String,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Largest accepted WebSocket message in bytes.
    pub max_message_bytes: usize,
}

/// Terminal session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a started terminal waits for a client to bind before it is discarded.
    pub bind_timeout_secs: u64,

    /// Maximum number of sessions held in the registry at once.
    pub max_sessions: usize,

    /// Capacity of the per-session resize queue.
    pub resize_queue_capacity: usize,

    /// Capacity of the per-connection stdin queue.
    pub stdin_queue_capacity: usize,
}

/// Settings for the kubectl-backed exec and log transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KubectlConfig {
    /// kubectl executable name or path.
    pub binary: String,

    /// Explicit kubeconfig file; kubectl's own lookup applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Context used when a request names no cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_context: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9090".to_string(),
            log_level: "info".to_string(),
            max_message_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_timeout_secs: 600, // 10 minutes
            max_sessions: 256,
            resize_queue_capacity: 4,
            stdin_queue_capacity: 64,
        }
    }
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            kubeconfig: None,
            default_context: None,
        }
    }
}

impl SessionConfig {
    /// The bind timeout as a [`Duration`].
    pub fn bind_timeout(&self) -> Duration {
        Duration::from_secs(self.bind_timeout_secs)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("podterm")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - PODTERM_LISTEN_ADDR: Override the listen address
    /// - PODTERM_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("PODTERM_LISTEN_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding listen_addr from environment: {}", addr);
                self.server.listen_addr = addr;
            }
        }

        if let Ok(level) = std::env::var("PODTERM_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.server.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(
                self.server.listen_addr.clone(),
            ));
        }

        if self.server.max_message_bytes == 0 {
            return Err(ConfigError::InvalidMaxMessageBytes(
                self.server.max_message_bytes,
            ));
        }

        let timeout = self.session.bind_timeout_secs;
        if !(1..=86_400).contains(&timeout) {
            return Err(ConfigError::InvalidBindTimeout(timeout));
        }

        if !(1..=10_000).contains(&self.session.max_sessions) {
            return Err(ConfigError::InvalidMaxSessions(self.session.max_sessions));
        }

        for (name, value) in [
            ("resize_queue_capacity", self.session.resize_queue_capacity),
            ("stdin_queue_capacity", self.session.stdin_queue_capacity),
        ] {
            if !(1..=MAX_QUEUE_CAPACITY).contains(&value) {
                return Err(ConfigError::InvalidQueueCapacity { name, value });
            }
        }

        if self.kubectl.binary.trim().is_empty() {
            return Err(ConfigError::EmptyKubectlBinary);
        }

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
