//! Pattern statistics and confidence scoring.

use crate::pattern::{Pattern, PatternKey, PatternKind};
use crate::{DEFAULT_SUCCESS_RATE, MAX_CONFIDENCE, MIN_CONFIDENCE, SATURATION_OBSERVATIONS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Confidence for `observations` samples at `success_rate`.
///
/// Grows linearly until [`SATURATION_OBSERVATIONS`] and is clamped into
/// `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
pub fn confidence_score(observations: u64, success_rate: f64) -> f64 {
    let rate = if success_rate.is_finite() {
        success_rate.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let base = (observations as f64 / SATURATION_OBSERVATIONS as f64).min(1.0);
    (base * rate).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// A pattern together with its attempt/success counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub pattern: Pattern,
    pub attempts: u64,
    pub successes: u64,
    pub first_seen: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl PatternRecord {
    fn new(pattern: Pattern) -> Self {
        let now = Utc::now();
        Self {
            pattern,
            attempts: 0,
            successes: 0,
            first_seen: now,
            last_used: now,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Read-only view of a learned pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub pattern: Pattern,
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
}

impl From<&PatternRecord> for LearnedPattern {
    fn from(record: &PatternRecord) -> Self {
        Self {
            pattern: record.pattern.clone(),
            attempts: record.attempts,
            successes: record.successes,
            success_rate: record.success_rate(),
        }
    }
}

/// Deduplicated pattern statistics, keyed by `(kind, signature)`.
#[derive(Debug, Clone)]
pub struct PatternStore {
    records: HashMap<PatternKey, PatternRecord>,
    default_success_rate: f64,
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            default_success_rate: DEFAULT_SUCCESS_RATE,
        }
    }

    /// Override the rate assumed for kinds without recorded attempts.
    pub fn with_default_success_rate(mut self, rate: f64) -> Self {
        self.default_success_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Count a success for `pattern`. Returns `true` when the signature is new.
    pub fn record_success(&mut self, pattern: &Pattern) -> bool {
        let mut is_new = false;
        let record = self.records.entry(pattern.key()).or_insert_with(|| {
            is_new = true;
            PatternRecord::new(pattern.clone())
        });
        record.attempts += 1;
        record.successes += 1;
        record.last_used = Utc::now();

        if is_new {
            debug!(pattern = %pattern.key(), "Learned new pattern");
        }
        is_new
    }

    /// Count an attempt that did not succeed. Unknown keys are ignored.
    pub fn record_attempt(&mut self, key: &PatternKey) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.attempts += 1;
                record.last_used = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Mark a pattern as used without changing its counters.
    pub fn touch(&mut self, key: &PatternKey) {
        if let Some(record) = self.records.get_mut(key) {
            record.last_used = Utc::now();
        }
    }

    pub fn get(&self, key: &PatternKey) -> Option<&PatternRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &PatternKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn success_rate(&self, key: &PatternKey) -> Option<f64> {
        self.records.get(key).map(PatternRecord::success_rate)
    }

    /// Confidence in a whole pattern kind, aggregated over its signatures.
    pub fn confidence(&self, kind: &PatternKind) -> f64 {
        let (attempts, successes) = self
            .records
            .values()
            .filter(|r| &r.pattern.kind == kind)
            .fold((0u64, 0u64), |(a, s), r| (a + r.attempts, s + r.successes));

        let rate = if attempts == 0 {
            self.default_success_rate
        } else {
            successes as f64 / attempts as f64
        };
        confidence_score(attempts, rate)
    }

    /// All patterns, best success rate first.
    pub fn top_patterns(&self) -> Vec<LearnedPattern> {
        let mut patterns: Vec<LearnedPattern> =
            self.records.values().map(LearnedPattern::from).collect();
        patterns.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.successes.cmp(&a.successes))
                .then_with(|| a.pattern.key().cmp(&b.pattern.key()))
        });
        patterns
    }

    /// Drop patterns not used since `cutoff`, returning their keys.
    pub fn retain_recent(&mut self, cutoff: DateTime<Utc>) -> Vec<PatternKey> {
        let stale: Vec<PatternKey> = self
            .records
            .iter()
            .filter(|(_, r)| r.last_used < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.records.remove(key);
        }
        stale
    }

    pub fn remove(&mut self, key: &PatternKey) -> Option<PatternRecord> {
        self.records.remove(key)
    }

    /// Insert a record as-is, replacing any existing one under the same key.
    pub fn restore(&mut self, record: PatternRecord) {
        self.records.insert(record.pattern.key(), record);
    }

    pub fn records(&self) -> impl Iterator<Item = &PatternRecord> {
        self.records.values()
    }

    /// Number of distinct kinds currently represented.
    pub fn kind_count(&self) -> usize {
        self.records
            .values()
            .map(|r| &r.pattern.kind)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}
