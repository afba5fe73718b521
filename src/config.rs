//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every field
//! has a default, so a missing file or a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_CACHE_TTL_SECS;
use crate::sync::{RetryPolicy, MAX_RETRIES, RETRY_DELAYS_MS};

/// Environment variable that overrides `apiToken`
pub const TOKEN_ENV_VAR: &str = "FLASHDECK_TOKEN";

const APP_DIR: &str = "flashdeck";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "flashdeck.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine the {0} directory")]
    DirNotFound(&'static str),

    #[error("Invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Where the local database lives (default: platform data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub max_retries: u32,
    pub retry_delays_ms: Vec<u64>,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            api_token: None,
            data_dir: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS as u64,
            max_retries: MAX_RETRIES,
            retry_delays_ms: RETRY_DELAYS_MS.to_vec(),
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::DirNotFound("config"))?;
        Ok(dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location. A missing file yields
    /// the defaults. The token environment variable wins over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let config: AppConfig = toml::from_str(&content)?;
            log::debug!("Config: loaded {}", path.display());
            config
        } else {
            log::debug!("Config: {} not found, using defaults", path.display());
            AppConfig::default()
        };

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                config.api_token = Some(token);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Write the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("apiBaseUrl", "must not be empty".to_string()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("maxRetries", "must be at least 1".to_string()));
        }
        if self.retry_delays_ms.is_empty() {
            return Err(ConfigError::Invalid("retryDelaysMs", "must list at least one delay".to_string()));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(ConfigError::DirNotFound("data")),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delays: self
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }
}
