//! Command worker configuration.

use reclaim_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder in `args` replaced by the job target.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Environment variable carrying the attack configuration as JSON.
pub const ATTACK_CONFIG_ENV: &str = "RECLAIM_ATTACK_CONFIG";

/// Environment variable carrying the job target.
pub const TARGET_ENV: &str = "RECLAIM_TARGET";

/// How to launch the external recovery program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandConfig {
    /// Program to execute, looked up on `PATH` when not absolute.
    pub program: String,
    /// Arguments; `{target}` is substituted per job.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Extra environment for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// How long `stop` waits for the child after asking it to terminate.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_args() -> Vec<String> {
    vec![TARGET_PLACEHOLDER.to_string()]
}

fn default_stop_grace_ms() -> u64 {
    5_000
}

impl CommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: default_args(),
            env: HashMap::new(),
            working_dir: None,
            stop_grace_ms: default_stop_grace_ms(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::Config("worker program must not be empty".into()));
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Arguments for one job with the target substituted.
    pub fn args_for(&self, target: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(TARGET_PLACEHOLDER, target))
            .collect()
    }
}
