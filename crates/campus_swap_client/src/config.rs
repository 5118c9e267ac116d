//! Client config load/save for `~/.campus-swap/config.yaml`.
//! Sections: `api.*`, `realtime.*`, `storage.*`. Every field is optional; the
//! accessors on [`Config`] fill in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://peertrade-backend.onrender.com/api";
pub const DEFAULT_REALTIME_URL: &str = "wss://campus-swap-api.onrender.com/socket";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// API section (base_url, timeout_secs).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Realtime section (url, reconnect_attempts, reconnect_delay_ms).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RealtimeSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,
}

/// Storage section (session_path).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StorageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_path: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub realtime: RealtimeSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// Fixed-delay reconnection policy for the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries after the first failed attempt.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

impl Config {
    pub fn api_base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn realtime_url(&self) -> &str {
        self.realtime.url.as_deref().unwrap_or(DEFAULT_REALTIME_URL)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self
                .realtime
                .reconnect_attempts
                .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
            delay: Duration::from_millis(
                self.realtime
                    .reconnect_delay_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
        }
    }

    /// Session file: `storage.session_path`, else `~/.campus-swap/session.json`.
    pub fn session_path(&self) -> Option<PathBuf> {
        match &self.storage.session_path {
            Some(p) => Some(PathBuf::from(p)),
            None => app_dir().map(|d| d.join("session.json")),
        }
    }
}

fn app_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".campus-swap"))
}

/// Returns the default config file path: `~/.campus-swap/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    app_dir().map(|d| d.join("config.yaml"))
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Like [`load`], but a missing file yields the default config.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        load(path)
    } else {
        tracing::debug!(path = %path.display(), "config file missing, using defaults");
        Ok(Config::default())
    }
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
    }
    let contents =
        serde_yaml::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(path, contents).map_err(|e| ConfigError::Io(e.to_string()))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid config: {0}")]
    Parse(String),
}
