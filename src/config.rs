// src/config.rs

//! Manages console configuration: loading, resolving defaults, and validation.

use crate::core::realtime::ReconnectPolicy;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Where the session record is persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per key under `storage.path`.
    #[default]
    File,
    /// Process memory only; every run starts logged out.
    Memory,
}

/// Session storage settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory holding the persisted session when `backend = "file"`.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> String {
    "vigil_data".to_string()
}

/// Realtime transport settings. Applied once, when a channel is opened.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RealtimeConfig {
    #[serde(default = "default_reconnection")]
    pub reconnection: bool,
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    #[serde(default = "default_reconnection_delay", with = "humantime_serde")]
    pub reconnection_delay: Duration,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnection: default_reconnection(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay: default_reconnection_delay(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl RealtimeConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnection,
            max_attempts: self.reconnection_attempts,
            delay: self.reconnection_delay,
        }
    }
}

fn default_reconnection() -> bool {
    true
}
fn default_reconnection_attempts() -> u32 {
    5
}
fn default_reconnection_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_ws_base_url")]
    ws_base_url: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    request_timeout: Duration,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    realtime: RealtimeConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}
fn default_ws_base_url() -> String {
    "ws://localhost:8000/api/v1/ws".to_string()
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_log_level() -> String {
    "info".to_string()
}

/// The final, validated console configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub ws_base_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub log_level: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_base_url: default_ws_base_url(),
            request_timeout: default_request_timeout(),
            log_level: default_log_level(),
            storage: StorageConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML config file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Like `from_file`, but a missing file yields the defaults.
    pub fn from_file_or_default(path: &str) -> Result<Self> {
        // Defaults still go through validation.
        if !Path::new(path).exists() {
            info!("No config file at '{}'. Using defaults.", path);
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::from_file(path)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;

        // Trailing slashes are dropped so endpoint paths can be appended.
        let config = Config {
            api_base_url: raw.api_base_url.trim_end_matches('/').to_string(),
            ws_base_url: raw.ws_base_url.trim_end_matches('/').to_string(),
            request_timeout: raw.request_timeout,
            log_level: raw.log_level,
            storage: raw.storage,
            realtime: raw.realtime,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        // --- Endpoints ---
        check_url("api_base_url", &self.api_base_url, &["http", "https"])?;
        check_url("ws_base_url", &self.ws_base_url, &["ws", "wss"])?;

        // --- Client and logging ---
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request_timeout cannot be 0"));
        }
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        // --- Storage ---
        if self.storage.backend == StorageBackend::File && self.storage.path.trim().is_empty() {
            return Err(anyhow!(
                "storage.path cannot be empty when the file backend is used"
            ));
        }
        // --- Realtime ---
        if self.realtime.reconnection && self.realtime.reconnection_delay.is_zero() {
            return Err(anyhow!(
                "realtime.reconnection_delay must be greater than 0 when reconnection is enabled"
            ));
        }
        if self.realtime.connect_timeout.is_zero() {
            return Err(anyhow!("realtime.connect_timeout cannot be 0"));
        }
        Ok(())
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let url = Url::parse(value).with_context(|| format!("{field} is not a valid URL: '{value}'"))?;
    if !schemes.contains(&url.scheme()) {
        return Err(anyhow!(
            "{} must use one of the schemes {:?}, got '{}'",
            field,
            schemes,
            url.scheme()
        ));
    }
    Ok(())
}
