//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// Prefix for environment variable overrides, e.g. `FLOODGATE__FLOOD_CONTROL__LIMIT`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Flood control configuration
    #[serde(default)]
    pub flood_control: FloodControlConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Flood control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodControlConfig {
    /// Maximum calls allowed per identity within the window
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Width of the trailing window in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// How often idle identities are evicted, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for FloodControlConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            period_ms: default_period_ms(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_period_ms() -> u64 {
    60_000
}

fn default_sweep_interval() -> u64 {
    60
}

impl FloodControlConfig {
    /// The window width as a `Duration`.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// The sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject values that can never work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(FloodgateError::Config(
                "flood_control.limit must be positive".to_string(),
            ));
        }
        if self.period_ms == 0 {
            return Err(FloodgateError::Config(
                "flood_control.period_ms must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(FloodgateError::Config(
                "flood_control.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values supplied on the command line, applied above file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub http_addr: Option<SocketAddr>,
    pub limit: Option<usize>,
    pub period_ms: Option<u64>,
}

impl FloodgateConfig {
    /// Load configuration from an optional YAML file, with `FLOODGATE__*`
    /// environment variables taking precedence and `overrides` above both.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(addr) = overrides.http_addr {
            builder = builder.set_override("server.http_addr", addr.to_string())?;
        }
        if let Some(limit) = overrides.limit {
            builder = builder.set_override("flood_control.limit", limit as i64)?;
        }
        if let Some(period_ms) = overrides.period_ms {
            builder = builder.set_override("flood_control.period_ms", period_ms as i64)?;
        }

        let config: FloodgateConfig = builder.build()?.try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.flood_control.validate()
    }
}
