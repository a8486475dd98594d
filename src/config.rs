// Configuration File Support
//
// TOML configuration for the relay, with environment variable overrides.
// Loaded from the platform config directory (e.g. ~/.config/mcp-relay/config.toml)
// unless --config points elsewhere.

use crate::mask::Secret;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "MCP_RELAY_";

/// Heartbeat interval bounds in seconds
pub const MIN_HEARTBEAT_SECS: u64 = 5;
pub const MAX_HEARTBEAT_SECS: u64 = 300;

const MIB: usize = 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Backend endpoint and credential
    pub backend: BackendConfig,

    /// Registration identity and session timing
    pub session: SessionConfig,

    /// Tool catalog cache
    pub cache: CacheConfig,

    /// Stdio framing ceilings
    pub limits: LimitsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Backend configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend API (may carry a path prefix)
    pub server_url: String,

    /// Preshared credential
    pub api_key: Secret,

    /// Accept self-signed certificates (development only)
    pub allow_self_signed: bool,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Hard ceiling on a response body
    pub max_response_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server_url: "https://localhost:8443".to_string(),
            api_key: Secret::default(),
            allow_self_signed: false,
            request_timeout_secs: 30,
            max_response_bytes: 10 * MIB,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Name shown for this connection in the backend
    pub friendly_name: String,

    /// Host tool identifier sent at registration
    pub tool_tag: String,

    /// Heartbeat interval; clamped to [5, 300] rather than rejected
    pub heartbeat_interval_seconds: u64,

    /// Upper bound on the disconnect notification at shutdown
    pub disconnect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            friendly_name: default_friendly_name(),
            tool_tag: "claude-desktop".to_string(),
            heartbeat_interval_seconds: 60,
            disconnect_timeout_ms: 2000,
        }
    }
}

fn default_friendly_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "mcp-relay".to_string())
}

/// Catalog cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot lifetime in seconds (0 = always refetch)
    pub ttl_seconds: u64,

    /// Disable caching entirely
    pub disabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            disabled: false,
        }
    }
}

/// Stdio framing limits
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Ceiling on unconsumed input; crossing it is fatal
    pub max_buffer_bytes: usize,

    /// Ceiling on one message; longer lines are dropped
    pub max_message_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 10 * MIB,
            max_message_bytes: MIB,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Clamp a heartbeat interval into [5, 300] seconds.
pub fn clamp_heartbeat_interval(seconds: u64) -> u64 {
    seconds.clamp(MIN_HEARTBEAT_SECS, MAX_HEARTBEAT_SECS)
}

impl Config {
    /// Load configuration from the default config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path and apply environment overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    /// The result is not validated; call [`Config::validate`] once all
    /// overrides (including command line flags) are in place.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::debug!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        Ok(config.apply_env_overrides())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/mcp-relay/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "mcp-relay", "mcp-relay") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("mcp-relay")
                .join("config.toml")
        }
    }

    /// Apply `MCP_RELAY_*` environment variable overrides
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from an arbitrary lookup (key without prefix).
    ///
    /// Recognized keys: SERVER_URL, API_KEY, FRIENDLY_NAME, TOOL_TAG,
    /// HEARTBEAT_INTERVAL, CACHE_TTL, DISABLE_CACHE, ALLOW_SELF_SIGNED,
    /// LOG_LEVEL, LOG_FORMAT. Unparseable numbers and booleans are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SERVER_URL") {
            self.backend.server_url = url;
        }
        if let Some(key) = lookup("API_KEY") {
            self.backend.api_key = Secret::new(key);
        }
        if let Some(allow) = lookup("ALLOW_SELF_SIGNED").and_then(|v| parse_bool(&v)) {
            self.backend.allow_self_signed = allow;
        }

        if let Some(name) = lookup("FRIENDLY_NAME") {
            self.session.friendly_name = name;
        }
        if let Some(tag) = lookup("TOOL_TAG") {
            self.session.tool_tag = tag;
        }
        if let Some(secs) = lookup("HEARTBEAT_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            self.session.heartbeat_interval_seconds = secs;
        }

        if let Some(ttl) = lookup("CACHE_TTL").and_then(|v| v.trim().parse().ok()) {
            self.cache.ttl_seconds = ttl;
        }
        if let Some(disabled) = lookup("DISABLE_CACHE").and_then(|v| parse_bool(&v)) {
            self.cache.disabled = disabled;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.backend.api_key.is_empty() {
            anyhow::bail!(
                "No API key configured. Set backend.api_key or {}API_KEY",
                ENV_PREFIX
            );
        }

        let url = reqwest::Url::parse(&self.backend.server_url)
            .with_context(|| format!("Invalid server URL: {}", self.backend.server_url))?;
        match url.scheme() {
            "https" | "http" => {}
            other => anyhow::bail!("Invalid server URL scheme: {}. Must be https or http", other),
        }

        if self.backend.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be > 0");
        }
        if self.backend.max_response_bytes == 0 {
            anyhow::bail!("Response size ceiling must be > 0");
        }

        if self.session.friendly_name.trim().is_empty() {
            anyhow::bail!("Friendly name must not be empty");
        }
        if self.session.tool_tag.trim().is_empty() {
            anyhow::bail!("Tool tag must not be empty");
        }

        if self.limits.max_buffer_bytes == 0 || self.limits.max_message_bytes == 0 {
            anyhow::bail!("Stdio limits must be > 0");
        }
        if self.limits.max_message_bytes > self.limits.max_buffer_bytes {
            anyhow::bail!(
                "Message ceiling ({}) must not exceed buffer ceiling ({})",
                self.limits.max_message_bytes,
                self.limits.max_buffer_bytes
            );
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Heartbeat interval after clamping.
    ///
    /// Logs one warning when the configured value was out of range.
    pub fn heartbeat_interval(&self) -> Duration {
        let configured = self.session.heartbeat_interval_seconds;
        let clamped = clamp_heartbeat_interval(configured);
        if clamped != configured {
            tracing::warn!(
                configured,
                clamped,
                "Heartbeat interval out of range [{}, {}], clamped",
                MIN_HEARTBEAT_SECS,
                MAX_HEARTBEAT_SECS
            );
        }
        Duration::from_secs(clamped)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.session.disconnect_timeout_ms)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
