//! Configuration for the ballot ledger

use crate::machine::CastPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ballot ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Range scan configuration
    pub scan: ScanConfig,

    /// Candidate cache configuration
    pub cache: CacheConfig,

    /// Vote casting rules
    pub voting: VotingConfig,

    /// Writer actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ballot"),
            service_name: "ballot-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            scan: ScanConfig::default(),
            cache: CacheConfig::default(),
            voting: VotingConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Range scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum entries returned by one range scan call
    pub page_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

/// Candidate cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the read-through candidate cache
    pub enabled: bool,

    /// Entry time-to-live (seconds)
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
        }
    }
}

/// Vote casting rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Whether a vote needs a registered candidate/election association
    pub cast_policy: CastPolicy,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            cast_policy: CastPolicy::RequireAssociation,
        }
    }
}

/// Writer actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox capacity
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BALLOT_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(page_size) = std::env::var("BALLOT_SCAN_PAGE_SIZE") {
            config.scan.page_size = page_size.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid BALLOT_SCAN_PAGE_SIZE: {}", e))
            })?;
        }

        if let Ok(ttl) = std::env::var("BALLOT_CACHE_TTL_SECS") {
            config.cache.ttl_secs = ttl.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid BALLOT_CACHE_TTL_SECS: {}", e))
            })?;
        }

        if let Ok(policy) = std::env::var("BALLOT_CAST_POLICY") {
            config.voting.cast_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.scan.page_size == 0 {
            return Err(crate::Error::Config(
                "scan.page_size must be at least 1".to_string(),
            ));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actor.mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
