//! Presence cache configuration.
//!
//! Provides configuration file support via `presence-cache.toml`,
//! environment variables and programmatic defaults.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`PRESENCE_CACHE_*`, sections separated by `__`,
//!    e.g. `PRESENCE_CACHE_CACHE__KEY_CACHE=disabled`)
//! 2. Configuration file (`presence-cache.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Largest accepted `cache.index_capacity`.
const MAX_INDEX_CAPACITY: usize = u32::MAX as usize;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Whether a cache keeps a presence index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCacheMode {
    /// Index only when the storage factory reports slow storage (default).
    #[default]
    Auto,
    /// Always keep a presence index.
    Enabled,
    /// Never keep a presence index; every call goes straight to storage.
    Disabled,
}

impl KeyCacheMode {
    /// Resolves the mode against the backend's speed.
    #[must_use]
    pub fn resolve(self, slow_storage: bool) -> bool {
        match self {
            Self::Auto => slow_storage,
            Self::Enabled => true,
            Self::Disabled => false,
        }
    }
}

/// Presence index configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Presence index mode.
    pub key_cache: KeyCacheMode,
    /// Number of buckets reserved up front in the presence index.
    pub index_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_cache: KeyCacheMode::Auto,
            index_capacity: 0,
        }
    }
}

/// Deferred reclamation worker configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimerConfig {
    /// Name given to the background worker thread.
    pub thread_name: String,
}

impl ReclaimerConfig {
    /// Validates the section.
    ///
    /// # Errors
    ///
    /// Returns an error if `thread_name` is empty or contains a NUL byte.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.thread_name;
        if name.is_empty() || name.contains('\0') {
            return Err(ConfigError::InvalidValue {
                key: "reclaimer.thread_name".to_string(),
                message: "must be non-empty and must not contain NUL bytes".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "presence-reclaim".to_string(),
        }
    }
}

/// Main `presence-cache` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PresenceConfig {
    /// Presence index configuration.
    pub cache: CacheConfig,
    /// Deferred reclamation worker configuration.
    pub reclaimer: ReclaimerConfig,
}

impl PresenceConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("presence-cache.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PRESENCE_CACHE_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.index_capacity > MAX_INDEX_CAPACITY {
            return Err(ConfigError::InvalidValue {
                key: "cache.index_capacity".to_string(),
                message: format!(
                    "value {} is out of range [0, {MAX_INDEX_CAPACITY}]",
                    self.cache.index_capacity
                ),
            });
        }

        self.reclaimer.validate()
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
