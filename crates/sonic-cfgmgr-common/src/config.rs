//! Configuration file support for the cfgmgr daemons
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/sonic/<daemon>.toml

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CfgMgrError, CfgMgrResult};
use crate::manager::{defaults, RetryPolicy};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
}

/// Event loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Retry timer period in milliseconds
    #[serde(default = "default_select_timeout")]
    pub select_timeout_ms: u64,

    /// Capacity of the table-change and link-event channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Handling of records whose external command failed
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log commands instead of running them
    #[serde(default)]
    pub dry_run: bool,
}

/// LAG creation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagConfig {
    /// MAC used when DEVICE_METADATA|localhost has none
    #[serde(default = "default_lag_mac")]
    pub default_mac: String,
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--redis-host`
    pub redis_host: Option<String>,
    /// `--redis-port`
    pub redis_port: Option<u16>,
    /// `--log-level`
    pub log_level: Option<String>,
    /// `--dry-run`
    pub dry_run: bool,
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Event loop configuration
    #[serde(default)]
    pub daemon: LoopConfig,

    /// LAG configuration
    #[serde(default)]
    pub lag: LagConfig,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_select_timeout() -> u64 {
    defaults::SELECT_TIMEOUT_MS
}

fn default_channel_capacity() -> usize {
    defaults::CHANNEL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_lag_mac() -> String {
    defaults::DEFAULT_LAG_MAC.to_string()
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            select_timeout_ms: default_select_timeout(),
            channel_capacity: default_channel_capacity(),
            retry_policy: RetryPolicy::default(),
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            default_mac: default_lag_mac(),
        }
    }
}

impl DaemonConfig {
    /// Returns the default config path for a daemon.
    pub fn default_path(daemon_name: &str) -> String {
        format!("/etc/sonic/{}.toml", daemon_name)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> CfgMgrResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                CfgMgrError::invalid_config(path.display().to_string(), e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(CfgMgrError::invalid_config(
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.redis_host {
            self.database.redis_host = host.clone();
        }
        if let Some(port) = overrides.redis_port {
            self.database.redis_port = port;
        }
        if let Some(level) = &overrides.log_level {
            self.daemon.log_level = level.clone();
        }
        if overrides.dry_run {
            self.daemon.dry_run = true;
        }
    }

    /// Get the retry timer period as Duration
    pub fn select_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon.select_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> CfgMgrResult<()> {
        if self.database.redis_port == 0 {
            return Err(CfgMgrError::invalid_config("redis_port", "must be > 0"));
        }

        if self.daemon.select_timeout_ms == 0 {
            return Err(CfgMgrError::invalid_config(
                "select_timeout_ms",
                "must be > 0",
            ));
        }

        if self.daemon.channel_capacity == 0 {
            return Err(CfgMgrError::invalid_config(
                "channel_capacity",
                "must be > 0",
            ));
        }

        if !is_valid_mac(&self.lag.default_mac) {
            return Err(CfgMgrError::invalid_config(
                "default_mac",
                format!("'{}' is not a MAC address", self.lag.default_mac),
            ));
        }

        Ok(())
    }
}

/// Returns true for `xx:xx:xx:xx:xx:xx` with hex digits.
pub fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}
