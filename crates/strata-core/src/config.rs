//! Strata configuration.
//!
//! All values have defaults suitable for local development and can be
//! overridden from environment variables via [`Config::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use strata_replication::ReplicationConfig;
use strata_storage::DEFAULT_BLOCK_SIZE;

/// Backing-store configuration.
///
/// `block_size` doubles as the slab size: it governs the threshold between
/// packed small objects and dedicated large-object slabs.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct StorageConfig {
    /// Path of the backing file or block device.
    #[builder(default = String::from("storage.data"))]
    pub path: String,

    /// Total bytes of the logical space.
    #[builder(default = 1024 * 1024 * 1024)]
    pub size: u64,

    /// Slab/block size in bytes.
    #[builder(default = DEFAULT_BLOCK_SIZE)]
    pub block_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: String::from("storage.data"),
            size: 1024 * 1024 * 1024,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Top-level configuration for a Strata node.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Config {
    /// Backing-store settings.
    #[builder(default)]
    pub storage: StorageConfig,

    /// Root directory for bucket and object descriptors.
    #[builder(default = String::from("metadata"))]
    pub metadata_root: String,

    /// Bind address for the HTTP front end.
    #[builder(default = String::from("0.0.0.0:9000"))]
    pub listen_addr: String,

    /// Log level filter (e.g. `info`, `debug`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Replication pipeline settings.
    #[builder(default)]
    pub replication: ReplicationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            metadata_root: String::from("metadata"),
            listen_addr: String::from("0.0.0.0:9000"),
            log_level: String::from("info"),
            replication: ReplicationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `STORAGE_PATH` | `storage.data` |
    /// | `STORAGE_SIZE` | `1073741824` (1 GiB) |
    /// | `STORAGE_BLOCK_SIZE` | `4194304` (4 MiB) |
    /// | `METADATA_ROOT` | `metadata` |
    /// | `LISTEN_ADDR` | `0.0.0.0:9000` |
    /// | `LOG_LEVEL` | `info` |
    /// | `REPLICATION_ENABLED` | `false` |
    /// | `REPLICATION_REMOTE_URL` | *(empty)* |
    /// | `REPLICATION_REMOTE_TOKEN` | *(unset)* |
    /// | `REPLICATION_BATCH_SIZE` | `100` |
    /// | `REPLICATION_BATCH_INTERVAL_MS` | `1000` |
    /// | `REPLICATION_RETRY_ATTEMPTS` | `3` |
    /// | `REPLICATION_RETRY_DELAY_MS` | `5000` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("STORAGE_PATH") {
            config.storage.path = v;
        }
        if let Some(v) = env_parse::<u64>("STORAGE_SIZE") {
            config.storage.size = v;
        }
        if let Some(v) = env_parse::<u64>("STORAGE_BLOCK_SIZE") {
            config.storage.block_size = v;
        }
        if let Ok(v) = std::env::var("METADATA_ROOT") {
            config.metadata_root = v;
        }
        if let Ok(v) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        if let Ok(v) = std::env::var("REPLICATION_ENABLED") {
            config.replication.enabled = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("REPLICATION_REMOTE_URL") {
            config.replication.remote_url = v;
        }
        if let Ok(v) = std::env::var("REPLICATION_REMOTE_TOKEN") {
            config.replication.remote_token = Some(v);
        }
        if let Some(v) = env_parse::<usize>("REPLICATION_BATCH_SIZE") {
            config.replication.batch_size = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("REPLICATION_BATCH_INTERVAL_MS") {
            config.replication.batch_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("REPLICATION_RETRY_ATTEMPTS") {
            config.replication.retry_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("REPLICATION_RETRY_DELAY_MS") {
            config.replication.retry_delay = Duration::from_millis(v);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Accept `"1"` and `"true"` (case-insensitive) as true.
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
