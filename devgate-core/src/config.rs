//! Configuration management for devgate
//!
//! Config files are stored in platform-appropriate locations:
//! - Linux: ~/.config/devgate/
//! - macOS: ~/Library/Application Support/devgate/
//! - Windows: %APPDATA%\devgate\

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    NoDirFound,

    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device simulator configuration (for devgate-server)
    #[serde(default)]
    pub server: ServerConfig,

    /// Client configuration (for devgate-cli)
    #[serde(default)]
    pub client: ClientConfig,

    /// Known devices
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Device simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Password set on first start
    #[serde(default = "default_password")]
    pub initial_password: String,

    /// Session token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,
}

/// Client-side configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device used when none is named on the command line
    pub default_device: Option<String>,

    /// Where the session token is persisted.
    /// Defaults to `session.toml` next to the config file.
    pub session_file: Option<PathBuf>,
}

/// Known device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device display name
    pub name: String,

    /// Base URL of the management API, e.g. `http://192.168.0.1`
    pub url: String,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    crate::DEFAULT_PORT
}
fn default_password() -> String {
    "admin".to_string()
}
fn default_token_ttl() -> u64 {
    24 * 60 * 60 // 24 hours
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            initial_password: default_password(),
            token_ttl: default_token_ttl(),
        }
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("devgate"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Session file location, explicit or next to the config file
    pub fn session_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.client.session_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("session.toml")),
        }
    }

    /// Get device config by name
    pub fn get_device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Add or update device
    pub fn upsert_device(&mut self, device: DeviceConfig) {
        if let Some(existing) = self.devices.iter_mut().find(|d| d.name == device.name) {
            *existing = device;
        } else {
            self.devices.push(device);
        }
    }

    /// Base URL for the named device, the default device, or localhost
    pub fn resolve_base_url(&self, device: Option<&str>) -> Result<String, ConfigError> {
        match device.or(self.client.default_device.as_deref()) {
            Some(name) => self
                .get_device(name)
                .map(|d| d.url.clone())
                .ok_or_else(|| ConfigError::UnknownDevice(name.to_string())),
            None => Ok(format!("http://127.0.0.1:{}", crate::DEFAULT_PORT)),
        }
    }
}
