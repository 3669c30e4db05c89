//! Configuration management for the reqflow engine.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use reqflow_server::config::EngineConfig;
//!
//! // Load from file with env overrides
//! let config = EngineConfig::load("reqflow.yaml")?;
//!
//! // Or load from environment only
//! let config = EngineConfig::from_env()?;
//!
//! let ctx = config.query_context();
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use reqflow_domain::{QueryContext, RequestCache, RequestCacheConfig};
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    /// Batching and scheduling settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// Request cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Scheduling settings.
///
/// Environment variables use the `REQFLOW_ENGINE__` prefix, for example
/// `REQFLOW_ENGINE__BATCHING=false`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineSettings {
    /// Combine independent requests to one resolver into a single call.
    #[serde(default = "default_true")]
    pub batching: bool,

    /// Deduplicate structurally equal requests through the request cache.
    #[serde(default = "default_true")]
    pub caching: bool,

    /// Upper bound on requests accepted by one batch handler call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batching: true,
            caching: true,
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_batch_size() -> usize {
    1000
}

/// Request cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// When false, queries stop deduplicating requests through the cache.
    /// The cache itself is still allocated and shared by every context
    /// built from this configuration, so explicit warm-ups keep working.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached requests
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Time to live of a cached request, in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_capacity() -> usize {
    65_536
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl EngineConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `REQFLOW_` and use `__` as
    /// separator. For example:
    /// - `REQFLOW_CACHE__TTL_SECS=60` overrides `cache.ttl_secs`
    /// - `REQFLOW_ENGINE__BATCHING=false` overrides `engine.batching`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;

        Ok(engine_config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Uses default values and allows overrides via REQFLOW_ prefixed env vars.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(env_source())
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;

        Ok(engine_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.engine.max_batch_size == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "engine.max_batch_size must be greater than 0".to_string(),
            });
        }

        if self.cache.capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.capacity must be greater than 0".to_string(),
            });
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.ttl_secs must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Cache settings in the form the engine takes them.
    pub fn cache_config(&self) -> RequestCacheConfig {
        RequestCacheConfig::default()
            .with_max_capacity(self.cache.capacity)
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
    }

    /// Builds a query context around a new cache sized from this
    /// configuration. Every query run with the context, and every clone of
    /// it, shares that one cache.
    ///
    /// A disabled cache turns request deduplication off in the context; the
    /// cache instance is still allocated so that explicit warm-ups through
    /// `cache_request_result` keep working.
    pub fn query_context(&self) -> QueryContext {
        QueryContext::with_cache_instance(Arc::new(RequestCache::new(self.cache_config())))
            .set_batching(self.engine.batching)
            .set_caching(self.engine.caching && self.cache.enabled)
    }
}

fn env_source() -> Environment {
    // REQFLOW_CACHE__TTL_SECS -> cache.ttl_secs
    Environment::with_prefix("REQFLOW")
        .prefix_separator("_")
        .separator("__")
}
