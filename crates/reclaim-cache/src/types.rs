//! Cache entries, lookup results and reports.

use crate::keys::CacheContext;
use chrono::{DateTime, Utc};
use reclaim_patterns::PatternRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a cached value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    #[default]
    Manual,
    /// Recorded by the batch scheduler after a successful job.
    Batch,
    /// Predicted from learned patterns rather than stored under the key.
    Pattern,
}

/// A resident cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: u64,
    #[serde(default)]
    pub source: EntrySource,
    #[serde(default)]
    pub context: CacheContext,
    /// Position in the LRU order.
    #[serde(skip)]
    pub(crate) access_seq: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, ttl_ms: u64, now: DateTime<Utc>) -> bool {
        if ttl_ms == 0 {
            return false;
        }
        let age = (now - self.created_at).num_milliseconds();
        i64::try_from(ttl_ms).is_ok_and(|ttl| age > ttl)
    }
}

/// Metadata returned with a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LookupMetadata {
    Direct {
        created_at: DateTime<Utc>,
        last_accessed_at: DateTime<Utc>,
        access_count: u64,
        source: EntrySource,
    },
    Pattern {
        pattern: String,
        confidence: f64,
    },
}

/// Result of a successful `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheLookup {
    pub value: String,
    pub metadata: LookupMetadata,
}

impl CacheLookup {
    pub fn source(&self) -> EntrySource {
        match &self.metadata {
            LookupMetadata::Direct { source, .. } => *source,
            LookupMetadata::Pattern { .. } => EntrySource::Pattern,
        }
    }

    pub fn is_prediction(&self) -> bool {
        matches!(self.metadata, LookupMetadata::Pattern { .. })
    }
}

/// One item of a batch `set`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSetItem {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub context: CacheContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSetResult {
    pub key: String,
    pub success: bool,
}

/// Running counters plus derived figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_requests: u64,
    pub memory_usage: u64,
    pub pattern_matches: u64,
    pub average_access_time_ms: f64,
    pub hit_rate: f64,
    pub size: usize,
    pub pattern_cache_size: usize,
    pub pattern_kinds: usize,
}

/// Capacity overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheInfo {
    pub size: usize,
    pub max_size: usize,
    pub memory_usage: u64,
    pub max_memory: u64,
    pub hit_rate: f64,
    pub pattern_cache_size: usize,
    pub average_access_time_ms: f64,
}

/// Learned prediction as written to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub value: String,
    /// Confidence at export time; informational only.
    #[serde(default)]
    pub confidence: f64,
    pub record: PatternRecord,
}

/// Serialized cache contents.
///
/// `cache` and `patterns` are kept as raw values so a single bad item can be
/// skipped on import without rejecting the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cache: Vec<(String, serde_json::Value)>,
    #[serde(default)]
    pub patterns: Vec<(String, serde_json::Value)>,
    #[serde(default)]
    pub statistics: Option<CacheStatistics>,
    /// Export time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_expired: usize,
    pub skipped_malformed: usize,
    pub rejected: usize,
    pub patterns_imported: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired_entries: usize,
    pub expired_patterns: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_entries == 0 && self.expired_patterns == 0
    }
}
