use std::env;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// Top-level flaggate.toml configuration.
///
/// ```toml
/// store_timeout_ms = 250
///
/// [store]
/// backend = "sled"
/// data_dir = "./data"
///
/// [cache]
/// enabled = true
/// ttl_secs = 900
///
/// [notifications]
/// enabled = true
/// ```
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    pub store_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ── Default value functions ──────────────────────────

fn default_backend() -> StorageBackend {
    StorageBackend::Sled
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    900
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if the file
    /// doesn't exist or cannot be parsed.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path, error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Read a TOML file, failing on a missing file or a parse error.
    pub fn read(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // FLAGGATE_STORAGE
        if let Some(val) = var("FLAGGATE_STORAGE") {
            match val.to_lowercase().as_str() {
                "sled" => self.store.backend = StorageBackend::Sled,
                "memory" => self.store.backend = StorageBackend::Memory,
                other => warn!(value = other, "unknown FLAGGATE_STORAGE value"),
            }
        }

        // FLAGGATE_DATA_DIR
        if let Some(val) = var("FLAGGATE_DATA_DIR") {
            self.store.data_dir = val;
        }

        // FLAGGATE_CACHE_ENABLED
        if let Some(val) = var("FLAGGATE_CACHE_ENABLED") {
            match parse_bool(&val) {
                Some(enabled) => self.cache.enabled = enabled,
                None => warn!(value = %val, "invalid FLAGGATE_CACHE_ENABLED value"),
            }
        }

        // FLAGGATE_CACHE_TTL — seconds
        if let Some(val) = var("FLAGGATE_CACHE_TTL") {
            match val.parse::<u64>() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => warn!(value = %val, "invalid FLAGGATE_CACHE_TTL value"),
            }
        }

        // FLAGGATE_NOTIFICATIONS
        if let Some(val) = var("FLAGGATE_NOTIFICATIONS") {
            match parse_bool(&val) {
                Some(enabled) => self.notifications.enabled = enabled,
                None => warn!(value = %val, "invalid FLAGGATE_NOTIFICATIONS value"),
            }
        }

        // FLAGGATE_STORE_TIMEOUT_MS — 0 disables the timeout
        if let Some(val) = var("FLAGGATE_STORE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(0) => self.store_timeout_ms = None,
                Ok(ms) => self.store_timeout_ms = Some(ms),
                Err(_) => warn!(value = %val, "invalid FLAGGATE_STORE_TIMEOUT_MS value"),
            }
        }
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
