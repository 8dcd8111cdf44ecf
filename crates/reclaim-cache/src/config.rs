//! Cache configuration.

use reclaim_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted entry lifetime: 100 years.
pub const MAX_TTL_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Candidate cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// Maximum number of resident entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Memory budget in MiB, measured with the entry size estimate.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    /// Entry lifetime in milliseconds. `0` disables expiry.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Learn patterns on `set` and answer misses from them.
    #[serde(default = "default_true")]
    pub enable_pattern_learning: bool,
    /// Interval of the background sweeper in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_memory_mb() -> u64 {
    50
}

fn default_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_memory_mb: default_max_memory_mb(),
            ttl_ms: default_ttl_ms(),
            enable_pattern_learning: true,
            sweep_interval_ms: default_sweep_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Config("cache max_entries must be at least 1".into()));
        }
        if self.max_memory_mb == 0 {
            return Err(Error::Config("cache max_memory_mb must be at least 1".into()));
        }
        if self.ttl_ms > MAX_TTL_MS {
            return Err(Error::Config(format!(
                "cache ttl_ms must be at most {MAX_TTL_MS}"
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config("cache sweep_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb * 1024 * 1024
    }

    /// `None` when expiry is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
