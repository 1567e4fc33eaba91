//! Store configuration.
//!
//! `StoreConfig` is built by the process's composition root and passed to
//! [`StoreManager::new`](crate::manager::StoreManager::new). There is no
//! implicit global configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default max connections for the PostgreSQL pool.
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 20;

/// Default connection acquire timeout for the PostgreSQL pool, in seconds.
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_SECS: u64 = 2;

/// Default idle timeout for the PostgreSQL pool, in seconds.
pub const DEFAULT_PG_IDLE_TIMEOUT_SECS: u64 = 30;

/// Default max pool size for the MongoDB client.
pub const DEFAULT_MONGO_MAX_POOL_SIZE: u32 = 10;

/// Default server-selection timeout for the MongoDB client, in seconds.
pub const DEFAULT_MONGO_SERVER_SELECTION_TIMEOUT_SECS: u64 = 5;

/// Default directory for embedded SQLite database files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Connection pool tuning options.
///
/// Every field is optional; `*_or_default()` accessors apply the documented
/// defaults. SQLite always uses a single connection regardless of these
/// options because the embedded store serializes physical access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in the PostgreSQL pool (default: 20)
    pub pg_max_connections: Option<u32>,
    /// PostgreSQL connection acquire timeout in seconds (default: 2)
    pub pg_acquire_timeout_secs: Option<u64>,
    /// PostgreSQL idle timeout in seconds (default: 30)
    pub pg_idle_timeout_secs: Option<u64>,
    /// Maximum pool size for the MongoDB client (default: 10)
    pub mongo_max_pool_size: Option<u32>,
    /// MongoDB server-selection timeout in seconds (default: 5)
    pub mongo_server_selection_timeout_secs: Option<u64>,
}

impl PoolOptions {
    pub fn pg_max_connections_or_default(&self) -> u32 {
        self.pg_max_connections.unwrap_or(DEFAULT_PG_MAX_CONNECTIONS)
    }

    pub fn pg_acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.pg_acquire_timeout_secs
                .unwrap_or(DEFAULT_PG_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn pg_idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.pg_idle_timeout_secs
                .unwrap_or(DEFAULT_PG_IDLE_TIMEOUT_SECS),
        )
    }

    pub fn mongo_max_pool_size_or_default(&self) -> u32 {
        self.mongo_max_pool_size
            .unwrap_or(DEFAULT_MONGO_MAX_POOL_SIZE)
    }

    pub fn mongo_server_selection_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.mongo_server_selection_timeout_secs
                .unwrap_or(DEFAULT_MONGO_SERVER_SELECTION_TIMEOUT_SECS),
        )
    }
}

/// Top-level store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory where embedded SQLite database files are created.
    pub data_dir: PathBuf,
    /// Pool tuning for the networked backends.
    #[serde(default)]
    pub pool: PoolOptions,
}

impl StoreConfig {
    /// Configuration rooted at the given data directory with default pools.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pool: PoolOptions::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_option_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.pg_max_connections_or_default(), 20);
        assert_eq!(opts.pg_acquire_timeout_or_default(), Duration::from_secs(2));
        assert_eq!(opts.pg_idle_timeout_or_default(), Duration::from_secs(30));
        assert_eq!(opts.mongo_max_pool_size_or_default(), 10);
        assert_eq!(
            opts.mongo_server_selection_timeout_or_default(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_pool_option_overrides() {
        let opts = PoolOptions {
            pg_max_connections: Some(5),
            pg_acquire_timeout_secs: Some(10),
            pg_idle_timeout_secs: Some(120),
            mongo_max_pool_size: Some(3),
            mongo_server_selection_timeout_secs: Some(1),
        };
        assert_eq!(opts.pg_max_connections_or_default(), 5);
        assert_eq!(opts.pg_acquire_timeout_or_default(), Duration::from_secs(10));
        assert_eq!(opts.mongo_max_pool_size_or_default(), 3);
    }

    #[test]
    fn test_store_config_default_data_dir() {
        let config = StoreConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }
}
