//! Configuration management for accessgate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{AccessGateError, Result};

/// Prefix for environment overrides, e.g. `ACCESSGATE__STORE__BACKEND=redis`.
const ENV_PREFIX: &str = "ACCESSGATE";

/// Main configuration for the accessgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessGateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Session token configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Access limiting configuration
    #[serde(default)]
    pub access: AccessConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
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

/// Which counter store to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local counters
    #[default]
    Memory,
    /// Shared counters in Redis
    Redis,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL, used when `backend` is `redis`
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// How often in-memory counters and sessions are swept for expired entries
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "AccessKey:access".to_string()
}

fn default_sweep_interval() -> u64 {
    30
}

/// Session token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of both the query parameter and the cookie carrying the token
    #[serde(default = "default_token_name")]
    pub token_name: String,

    /// Sliding session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_name: default_token_name(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_token_name() -> String {
    "token".to_string()
}

fn default_session_ttl() -> u64 {
    3600 * 24 * 2
}

/// What the gate does when the counter store fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Propagate the fault; the request fails with 503
    #[default]
    FailClosed,
    /// Log the fault and let the request through
    FailOpen,
}

/// Access limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Path to the per-endpoint policy file
    #[serde(default)]
    pub policies_path: Option<String>,

    /// Behavior on counter store faults
    #[serde(default)]
    pub on_store_error: StoreFailurePolicy,
}

impl AccessGateConfig {
    /// Load configuration from a single YAML file.
    ///
    /// Unlike [`load`](Self::load), environment overrides are not applied.
    /// Useful for embedders that keep their own environment handling.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AccessGateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| AccessGateError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file, then apply
    /// `ACCESSGATE__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AccessGateError::Config(e.to_string()))
    }
}
