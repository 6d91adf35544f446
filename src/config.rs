//! Configuration management for the limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RateWindowError, Result};

/// Prefix of environment variables read by [`RateWindowConfig::load`].
pub const ENV_PREFIX: &str = "RATEWINDOW";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowConfig {
    /// Limiter policy
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Shared store connection
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Limiter policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Hits allowed per window
    #[serde(default = "default_max")]
    pub max: u64,

    /// Window length in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Prefix of the store key, joined to the identifier with a colon
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max: default_max(),
            duration_ms: default_duration_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_max() -> u64 {
    2500
}

fn default_duration_ms() -> u64 {
    3_600_000
}

fn default_key_prefix() -> String {
    "limit".to_string()
}

impl LimiterConfig {
    /// Window length as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Reject policies the limiter cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.max == 0 {
            return Err(RateWindowError::InvalidConfiguration(
                "max must be greater than zero".to_string(),
            ));
        }
        if self.duration_ms == 0 {
            return Err(RateWindowError::InvalidConfiguration(
                "duration must be greater than zero".to_string(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(RateWindowError::InvalidConfiguration(
                "key prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Per-call timeout in milliseconds; unset means wait indefinitely
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            timeout_ms: None,
        }
    }
}

impl RedisConfig {
    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Reject connection settings every call would fail under.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == Some(0) {
            return Err(RateWindowError::InvalidConfiguration(
                "redis timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl RateWindowConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;
        self.redis.validate()
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RateWindowConfig = serde_yaml::from_str(yaml).map_err(|e| {
            RateWindowError::InvalidConfiguration(format!("Failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Layer defaults, an optional YAML file, and `RATEWINDOW_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `RATEWINDOW_LIMITER__MAX=10`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading limiter configuration");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        Self::build(builder.add_source(environment()))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: RateWindowConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                RateWindowError::InvalidConfiguration(format!("Failed to load config: {}", e))
            })?;
        config.validate()?;
        Ok(config)
    }
}
