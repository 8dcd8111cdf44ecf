//! Scheduler configuration.

use reclaim_core::job::MIN_PRIORITY;
use reclaim_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a failed job goes back into the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetryPriority {
    /// Keep the priority the job was enqueued with.
    #[default]
    Original,
    /// One band lower per retry, never below the minimum.
    Demote,
}

impl RetryPriority {
    pub fn priority_for(&self, priority: u8, retry_count: u32) -> u8 {
        match self {
            RetryPriority::Original => priority,
            RetryPriority::Demote => {
                let step = u8::try_from(retry_count).unwrap_or(u8::MAX);
                priority.saturating_sub(step).max(MIN_PRIORITY)
            }
        }
    }
}

/// Batch scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Limit per attempt in milliseconds. Time spent paused does not count.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long `stop` waits for each worker before aborting it.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Entries kept in each of the completed and failed histories.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub retry_priority: RetryPriority,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    30 * 60 * 1000
}

fn default_stop_grace_ms() -> u64 {
    10_000
}

fn default_history_limit() -> usize {
    500
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            history_limit: default_history_limit(),
            event_capacity: default_event_capacity(),
            retry_priority: RetryPriority::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout(), Duration::from_secs(1800));
        assert_eq!(config.stop_grace(), Duration::from_secs(10));
        assert_eq!(config.retry_priority, RetryPriority::Original);
    }

    #[test]
    fn test_retry_priority() {
        assert_eq!(RetryPriority::Original.priority_for(7, 3), 7);
        assert_eq!(RetryPriority::Demote.priority_for(7, 3), 4);
        assert_eq!(RetryPriority::Demote.priority_for(2, 5), 1);
    }

    #[test]
    fn test_validate() {
        let config = SchedulerConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let parsed: SchedulerConfig =
            serde_json::from_str(r#"{"max_concurrent": 4, "retry_priority": "demote"}"#).unwrap();
        assert_eq!(parsed.max_concurrent, 4);
        assert_eq!(parsed.retry_priority, RetryPriority::Demote);
        assert_eq!(parsed.history_limit, 500);
    }
}
