//! Recovery job types.

use crate::error::{Error, Result};
use crate::ids::JobId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest accepted job priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest accepted job priority.
pub const MAX_PRIORITY: u8 = 10;
/// Priority used when the caller does not pick one.
pub const DEFAULT_PRIORITY: u8 = 5;
/// Upper bound on candidate length after pattern tuning.
pub const MAX_CANDIDATE_LENGTH: u32 = 20;

/// Validate a priority value.
pub fn validate_priority(priority: u8) -> Result<u8> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(Error::InvalidPriority(priority))
    }
}

/// Character classes a search can draw candidates from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Lowercase,
    Numbers,
    Special,
    Uppercase,
}

impl CharClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharClass::Lowercase => "lowercase",
            CharClass::Numbers => "numbers",
            CharClass::Special => "special",
            CharClass::Uppercase => "uppercase",
        }
    }

    /// Classify a single character.
    pub fn of(c: char) -> Self {
        if c.is_ascii_lowercase() {
            CharClass::Lowercase
        } else if c.is_ascii_uppercase() {
            CharClass::Uppercase
        } else if c.is_ascii_digit() {
            CharClass::Numbers
        } else {
            CharClass::Special
        }
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search configuration handed to a worker.
///
/// The scheduler only rewrites the length bounds, `charset`, `custom_patterns`
/// and `candidates`; everything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttackConfig {
    #[serde(default = "default_attack_mode")]
    pub attack_mode: String,
    #[serde(default = "default_charset")]
    pub charset: Vec<CharClass>,
    #[serde(default = "default_min_length")]
    pub min_length: u32,
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default = "default_true")]
    pub use_cpu_multi_thread: bool,
    /// Structural hints such as `YYMMDD`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_patterns: Vec<String>,
    /// Values the worker should try before anything else.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    /// Size of the target artifact in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size: Option<u64>,
    /// Engine-specific settings.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_attack_mode() -> String {
    "smart".to_string()
}

fn default_charset() -> Vec<CharClass> {
    vec![CharClass::Lowercase, CharClass::Numbers]
}

fn default_min_length() -> u32 {
    1
}

fn default_max_length() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            attack_mode: default_attack_mode(),
            charset: default_charset(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            use_gpu: false,
            use_cpu_multi_thread: true,
            custom_patterns: vec![],
            candidates: vec![],
            target_size: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl AttackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_length == 0 {
            return Err(Error::InvalidJob("min_length must be at least 1".into()));
        }
        if self.min_length > self.max_length {
            return Err(Error::InvalidJob(format!(
                "min_length {} exceeds max_length {}",
                self.min_length, self.max_length
            )));
        }
        if self.charset.is_empty() && self.candidates.is_empty() {
            return Err(Error::InvalidJob(
                "charset must not be empty unless candidates are given".into(),
            ));
        }
        Ok(())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Progress report from a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressUpdate {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub percent: f64,
    /// Candidates per second.
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub eta_secs: u64,
    #[serde(default)]
    pub tested: u64,
    #[serde(default)]
    pub total: u64,
}

impl ProgressUpdate {
    pub fn queued() -> Self {
        Self {
            phase: "queued".to_string(),
            ..Default::default()
        }
    }

    /// Clamp `percent` into 0..=100.
    pub fn normalized(mut self) -> Self {
        if !self.percent.is_finite() {
            self.percent = 0.0;
        }
        self.percent = self.percent.clamp(0.0, 100.0);
        self
    }
}

/// What a worker reports when an attempt settles successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkerOutcome {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub units_tested: u64,
}

impl WorkerOutcome {
    pub fn found(value: impl Into<String>, units_tested: u64) -> Self {
        Self {
            found: true,
            value: Some(value.into()),
            units_tested,
        }
    }

    pub fn not_found(units_tested: u64) -> Self {
        Self {
            found: false,
            value: None,
            units_tested,
        }
    }

    /// The recovered value, if the attempt found one.
    pub fn secret(&self) -> Option<&str> {
        if self.found {
            self.value.as_deref().filter(|v| !v.is_empty())
        } else {
            None
        }
    }
}

/// A unit of recovery work.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub target: String,
    pub file_name: String,
    pub config: AttackConfig,
    pub priority: u8,
    pub status: JobStatus,
    pub retry_count: u32,
    pub progress: ProgressUpdate,
    pub result: Option<WorkerOutcome>,
    pub error: Option<String>,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job after validating its parameters.
    pub fn new(target: impl Into<String>, config: AttackConfig, priority: u8) -> Result<Self> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(Error::InvalidJob("target must not be empty".into()));
        }
        validate_priority(priority)?;
        config.validate()?;

        Ok(Self {
            id: JobId::new(),
            file_name: file_name_of(&target).to_string(),
            target,
            config,
            priority,
            status: JobStatus::Queued,
            retry_count: 0,
            progress: ProgressUpdate::queued(),
            result: None,
            error: None,
            added_at: Utc::now(),
            started_at: None,
            completed_at: None,
        })
    }
}

/// Last component of a `/` or `\` separated path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
