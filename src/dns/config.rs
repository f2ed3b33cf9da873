//! Domain store configuration
//!
//! Settings can be built in code or read from a TOML file:
//!
//! ```toml
//! cache_file = "/var/lib/domainwatch/dns-cache.txt"
//! save_interval_secs = 10
//! epoch = 3
//! extra_ttl_secs = 60
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::Deserialize;

use crate::dns::errors::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where learned mappings are persisted across restarts
    pub cache_file: PathBuf,
    pub save_interval_secs: u64,
    pub gc_interval_secs: u64,
    /// Changing the epoch at runtime flushes every learned mapping
    pub epoch: i64,
    /// Added to every DNS TTL before the mapping is stored
    pub extra_ttl_secs: u64,
    /// Pair requests with responses to measure DNS latency
    pub measure_latency: bool,
    /// Debug only: hold back "updates ready" to simulate slow propagation.
    /// The wait blocks the thread it happens on; use a multi-threaded
    /// runtime when setting this.
    pub response_delay_ms: u64,
    /// Captured packets that may queue before capture blocks
    pub queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            cache_file: PathBuf::from("/var/run/domainwatch/dns-cache.txt"),
            save_interval_secs: 10,
            gc_interval_secs: 13,
            epoch: 0,
            extra_ttl_secs: 0,
            measure_latency: false,
            response_delay_ms: 0,
            queue_capacity: 1000,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(contents: &str) -> Result<StoreConfig> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<StoreConfig> {
        let contents = fs::read_to_string(path)?;
        StoreConfig::from_toml_str(&contents)
    }

    /// Rejects settings the event loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.save_interval_secs == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "save_interval_secs must be at least 1".to_string(),
            });
        }
        if self.gc_interval_secs == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "gc_interval_secs must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn extra_ttl(&self) -> Duration {
        Duration::from_secs(self.extra_ttl_secs)
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }
}

/// Runtime-adjustable subset of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub epoch: i64,
    pub extra_ttl: Duration,
}
