//! CLI configuration management.

use crate::commands::RunArgs;
use anyhow::{Context, bail};
use reclaim_cache::CacheConfig;
use reclaim_core::job::AttackConfig;
use reclaim_scheduler::SchedulerConfig;
use reclaim_worker::CommandConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "reclaim.yaml";

/// Everything `reclaim` reads from `reclaim.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclaimConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// External recovery program.
    #[serde(default)]
    pub worker: Option<CommandConfig>,
    /// Attack configuration every job starts from.
    #[serde(default)]
    pub attack: AttackConfig,
    /// Snapshot restored before and saved after each batch.
    #[serde(default)]
    pub cache_snapshot: Option<PathBuf>,
}

impl ReclaimConfig {
    /// Load from `explicit` if given, else from the platform config dir.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("rs", "reclaim", "reclaim")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Fold command-line flags over the file values.
    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if let Some(program) = &args.worker {
            let mut worker = CommandConfig::new(program.clone());
            if !args.args.is_empty() {
                worker.args = args.args.clone();
            }
            if let Some(existing) = &self.worker {
                worker.env = existing.env.clone();
                worker.working_dir = existing.working_dir.clone();
                worker.stop_grace_ms = existing.stop_grace_ms;
            }
            self.worker = Some(worker);
        } else if let Some(worker) = self.worker.as_mut() {
            if !args.args.is_empty() {
                worker.args = args.args.clone();
            }
        }

        if let Some(max_concurrent) = args.max_concurrent {
            self.scheduler.max_concurrent = max_concurrent;
        }
        if let Some(max_retries) = args.max_retries {
            self.scheduler.max_retries = max_retries;
        }
        if let Some(secs) = args.timeout_secs {
            self.scheduler.timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(mode) = &args.mode {
            self.attack.attack_mode = mode.clone();
        }
        if let Some(path) = &args.cache_snapshot {
            self.cache_snapshot = Some(path.clone());
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.scheduler.validate()?;
        self.cache.validate()?;
        self.attack.validate()?;
        if let Some(worker) = &self.worker {
            worker.validate()?;
        }
        Ok(())
    }

    /// The worker to run, which must be configured somewhere.
    pub fn require_worker(&self) -> anyhow::Result<&CommandConfig> {
        match &self.worker {
            Some(worker) => Ok(worker),
            None => bail!("no worker configured: pass --worker or set worker.program in {CONFIG_FILE_NAME}"),
        }
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
