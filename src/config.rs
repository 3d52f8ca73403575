//! Configuration for a sluice rate limiter instance.

use serde::{Deserialize, Serialize};

/// Main configuration for one limiter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Namespace for this limiter. Used as the key prefix on the remote
    /// store so limiters sharing one Redis do not collide.
    pub namespace: String,

    /// Strategy selection
    pub strategy: StrategyConfig,

    /// Which state store backend to use
    #[serde(default)]
    pub storage: StorageKind,

    /// Remote store connection parameters
    #[serde(default)]
    pub redis: RedisConfig,

    /// In-process store parameters
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Strategy selection: an algorithm tag plus the time unit every rule
/// duration and stored timestamp is expressed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// One of "static_window", "rolling_window", "fixed_bucket"
    #[serde(rename = "type")]
    pub kind: String,

    /// One of "ns", "us", "ms", "s"
    #[serde(rename = "timeUnit")]
    pub time_unit: String,
}

/// State store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// In-process TTL cache
    #[default]
    Memory,
    /// Remote Redis hash store
    Redis,
}

/// Connection parameters for the Redis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// host:port of the Redis server
    #[serde(default = "default_redis_host")]
    pub host: String,

    /// Password, empty for none
    #[serde(default)]
    pub password: String,

    /// Database number
    #[serde(default)]
    pub db: i64,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_conn_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Per-command response timeout in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            password: String::new(),
            db: 0,
            connection_timeout_ms: default_conn_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_redis_host() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_conn_timeout_ms() -> u64 {
    10_000
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

/// Parameters for the in-process store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// TTL applied to stored counters, in milliseconds. Zero disables
    /// expiration entirely.
    #[serde(default)]
    pub expiration_ms: u64,

    /// How often the sweeper drops expired counters, in milliseconds.
    /// Zero disables the sweeper; expired entries are then only dropped
    /// lazily on access.
    #[serde(default)]
    pub cleanup_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            expiration_ms: 0,
            cleanup_interval_ms: 0,
        }
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::SluiceError::Config(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| crate::error::SluiceError::Config(e.to_string()))
    }
}
