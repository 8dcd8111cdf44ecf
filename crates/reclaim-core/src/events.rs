//! Typed notifications emitted by the scheduler and the candidate cache.

use crate::ids::JobId;
use crate::job::{ProgressUpdate, WorkerOutcome};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregate batch counters, carried by lifecycle events and status snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchStats {
    pub total_jobs: u64,
    /// Jobs that reached a final state.
    pub processed: u64,
    /// Jobs whose worker ran to the end, whether or not it found the secret.
    /// Use `total_secrets_found` for recoveries.
    pub succeeded: u64,
    /// Jobs that exhausted their retries.
    pub failed: u64,
    pub total_units_tested: u64,
    pub total_secrets_found: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Events in the batch scheduler lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    JobAdded {
        job_id: JobId,
        target: String,
        priority: u8,
    },
    Started {
        at: DateTime<Utc>,
    },
    Paused,
    Resumed,
    Stopped {
        at: DateTime<Utc>,
    },
    Completed {
        stats: BatchStats,
    },
    JobStarted {
        job_id: JobId,
        attempt: u32,
        applied_patterns: Vec<String>,
    },
    JobProgress {
        job_id: JobId,
        progress: ProgressUpdate,
    },
    JobCompleted {
        job_id: JobId,
        outcome: WorkerOutcome,
    },
    JobRetry {
        job_id: JobId,
        retry_count: u32,
        error: String,
    },
    JobFailed {
        job_id: JobId,
        retry_count: u32,
        error: String,
    },
    JobRemoved {
        job_id: JobId,
        was_running: bool,
    },
    PriorityChanged {
        job_id: JobId,
        priority: u8,
    },
    PatternLearned {
        job_id: JobId,
        patterns: Vec<String>,
    },
}

impl SchedulerEvent {
    /// Stable event name, as shown to telemetry consumers.
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerEvent::JobAdded { .. } => "job-added",
            SchedulerEvent::Started { .. } => "started",
            SchedulerEvent::Paused => "paused",
            SchedulerEvent::Resumed => "resumed",
            SchedulerEvent::Stopped { .. } => "stopped",
            SchedulerEvent::Completed { .. } => "completed",
            SchedulerEvent::JobStarted { .. } => "job-started",
            SchedulerEvent::JobProgress { .. } => "job-progress",
            SchedulerEvent::JobCompleted { .. } => "job-completed",
            SchedulerEvent::JobRetry { .. } => "job-retry",
            SchedulerEvent::JobFailed { .. } => "job-failed",
            SchedulerEvent::JobRemoved { .. } => "job-removed",
            SchedulerEvent::PriorityChanged { .. } => "priority-changed",
            SchedulerEvent::PatternLearned { .. } => "pattern-learned",
        }
    }

    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SchedulerEvent::JobAdded { job_id, .. }
            | SchedulerEvent::JobStarted { job_id, .. }
            | SchedulerEvent::JobProgress { job_id, .. }
            | SchedulerEvent::JobCompleted { job_id, .. }
            | SchedulerEvent::JobRetry { job_id, .. }
            | SchedulerEvent::JobFailed { job_id, .. }
            | SchedulerEvent::JobRemoved { job_id, .. }
            | SchedulerEvent::PriorityChanged { job_id, .. }
            | SchedulerEvent::PatternLearned { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

/// Why a cache entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    Lru,
    Expired,
}

/// Events emitted by the candidate cache.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    CacheHit {
        key: String,
        access_count: u64,
    },
    CacheMiss {
        key: String,
    },
    PatternMatch {
        key: String,
        pattern: String,
        confidence: f64,
    },
    CacheSet {
        key: String,
        size_bytes: u64,
    },
    CacheDelete {
        key: String,
    },
    CacheCleared {
        entries_cleared: usize,
    },
    CacheEviction {
        key: String,
        reason: EvictionReason,
    },
    Cleanup {
        expired_entries: usize,
        expired_patterns: usize,
    },
    PatternLearned {
        patterns: Vec<String>,
    },
}

impl CacheEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::CacheHit { .. } => "cache-hit",
            CacheEvent::CacheMiss { .. } => "cache-miss",
            CacheEvent::PatternMatch { .. } => "pattern-match",
            CacheEvent::CacheSet { .. } => "cache-set",
            CacheEvent::CacheDelete { .. } => "cache-delete",
            CacheEvent::CacheCleared { .. } => "cache-cleared",
            CacheEvent::CacheEviction { .. } => "cache-eviction",
            CacheEvent::Cleanup { .. } => "cleanup",
            CacheEvent::PatternLearned { .. } => "pattern-learned",
        }
    }
}
