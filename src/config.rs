//! Configuration management for Bulwark.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{BulwarkError, Result};
use crate::ratelimit::{BurstRule, TierLimitTable};

/// Prefix for environment variable overrides, e.g. `BULWARK__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "BULWARK";

/// Main configuration for the Bulwark service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulwarkConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Proof-of-work configuration
    #[serde(default)]
    pub pow: PowConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
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
    SocketAddr::from(([127, 0, 0, 1], 8089))
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis URL; the in-memory store is used when absent
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix prepended to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_key_prefix() -> String {
    "bulwark:".to_string()
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    25
}

fn default_backoff_max_ms() -> u64 {
    200
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Hourly limits enforced by the distributed counter
    #[serde(default = "TierLimitTable::default_hourly")]
    pub hourly: TierLimitTable,

    /// Daily caps enforced through the quota ledger
    #[serde(default = "TierLimitTable::default_daily")]
    pub daily: TierLimitTable,

    /// Total resource caps enforced through the quota ledger
    #[serde(default = "TierLimitTable::default_total")]
    pub total: TierLimitTable,

    /// Per-operation burst rules
    #[serde(default)]
    pub burst: HashMap<String, BurstRule>,

    /// Burst rule for operations without their own entry
    #[serde(default)]
    pub default_burst: BurstRule,

    /// Interval between sweeps of expired burst windows, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            hourly: TierLimitTable::default_hourly(),
            daily: TierLimitTable::default_daily(),
            total: TierLimitTable::default_total(),
            burst: HashMap::new(),
            default_burst: BurstRule::default(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RateLimitingConfig {
    /// The burst rule applying to an operation.
    pub fn burst_rule(&self, operation: &str) -> BurstRule {
        self.burst.get(operation).copied().unwrap_or(self.default_burst)
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Proof-of-work configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowConfig {
    /// What the challenges protect; scopes the stored challenge key
    #[serde(default = "default_purpose")]
    pub purpose: String,

    /// Challenge lifetime in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Required leading zero hex digits per tier
    #[serde(default = "default_difficulty")]
    pub difficulty: HashMap<String, u32>,

    /// Hashes per second assumed when estimating solve time
    #[serde(default = "default_hash_rate")]
    pub assumed_hash_rate: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            purpose: default_purpose(),
            challenge_ttl_secs: default_challenge_ttl(),
            difficulty: default_difficulty(),
            assumed_hash_rate: default_hash_rate(),
        }
    }
}

impl PowConfig {
    /// Challenge lifetime as a `Duration`.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }
}

fn default_purpose() -> String {
    "mutation".to_string()
}

fn default_challenge_ttl() -> u64 {
    300
}

fn default_difficulty() -> HashMap<String, u32> {
    HashMap::from([
        ("anonymous".to_string(), 5),
        ("free".to_string(), 4),
        ("pro".to_string(), 2),
        ("enterprise".to_string(), 0),
    ])
}

fn default_hash_rate() -> u64 {
    1_000_000
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl BulwarkConfig {
    /// Load configuration from an optional YAML file layered with
    /// `BULWARK__`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|settings| settings.try_deserialize::<BulwarkConfig>())
            .map_err(|e| BulwarkError::Config(e.to_string()))
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| BulwarkError::Config(e.to_string()))
    }
}
