//! The candidate cache.

use crate::config::CacheConfig;
use crate::keys::{CacheContext, estimate_entry_size, generate_cache_key};
use crate::types::{
    BatchSetItem, BatchSetResult, CacheEntry, CacheInfo, CacheLookup, CacheStatistics,
    ImportReport, LookupMetadata, PredictionSnapshot, Snapshot, SweepReport,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reclaim_core::events::{CacheEvent, EvictionReason};
use reclaim_core::{Error, Result};
use reclaim_patterns::{PatternKey, PatternStore, extract_patterns};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Minimum kind confidence for a learned prediction to answer a miss.
pub const PATTERN_MATCH_THRESHOLD: f64 = 0.6;

/// Number of recent lookups the average access time is computed over.
const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    total_requests: u64,
    pattern_matches: u64,
}

/// Bounded, TTL-aware LRU cache of recovered values with a pattern layer
/// that can answer misses.
pub struct CandidateCache {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry>,
    /// Access sequence -> key. The first element is the least recently used.
    lru: BTreeMap<u64, String>,
    access_counter: u64,
    memory_usage: u64,
    patterns: PatternStore,
    predictions: HashMap<PatternKey, String>,
    counters: Counters,
    latencies: VecDeque<Duration>,
    events: broadcast::Sender<CacheEvent>,
}

impl CandidateCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            config,
            entries: HashMap::new(),
            lru: BTreeMap::new(),
            access_counter: 0,
            memory_usage: 0,
            patterns: PatternStore::new(),
            predictions: HashMap::new(),
            counters: Counters::default(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            events,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value, falling back to learned predictions on a miss.
    pub fn get(&mut self, primary: &str, context: &CacheContext) -> Option<CacheLookup> {
        let started = Instant::now();
        self.counters.total_requests += 1;
        let key = generate_cache_key(primary, context);

        if let Some(lookup) = self.lookup_direct(&key, Utc::now()) {
            self.counters.hits += 1;
            self.record_latency(started);
            if let LookupMetadata::Direct { access_count, .. } = lookup.metadata {
                self.emit(CacheEvent::CacheHit { key, access_count });
            }
            return Some(lookup);
        }

        if self.config.enable_pattern_learning {
            if let Some(lookup) = self.find_prediction(context) {
                self.counters.pattern_matches += 1;
                self.record_latency(started);
                if let LookupMetadata::Pattern { pattern, confidence } = &lookup.metadata {
                    debug!(key = %key, pattern = %pattern, confidence, "Answered miss from pattern");
                    self.emit(CacheEvent::PatternMatch {
                        key,
                        pattern: pattern.clone(),
                        confidence: *confidence,
                    });
                }
                return Some(lookup);
            }
        }

        self.counters.misses += 1;
        self.record_latency(started);
        self.emit(CacheEvent::CacheMiss { key });
        None
    }

    /// Store a value. Returns `false` when the entry alone exceeds the memory budget.
    pub fn set(&mut self, primary: &str, value: &str, context: &CacheContext) -> bool {
        let key = generate_cache_key(primary, context);
        let size_bytes = estimate_entry_size(primary, value);

        if size_bytes > self.config.max_memory_bytes() {
            warn!(
                key = %key,
                size_bytes,
                max_memory = self.config.max_memory_bytes(),
                "Entry larger than the cache memory budget"
            );
            return false;
        }

        self.remove_entry(&key);
        self.ensure_capacity(size_bytes);

        let now = Utc::now();
        self.insert_entry(CacheEntry {
            key: key.clone(),
            value: value.to_string(),
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            size_bytes,
            source: context.source.unwrap_or_default(),
            context: context.clone(),
            access_seq: 0,
        });

        if self.config.enable_pattern_learning {
            self.learn(value, context);
        }

        trace!(key = %key, size_bytes, "Cached value");
        self.emit(CacheEvent::CacheSet { key, size_bytes });
        true
    }

    pub fn set_batch(&mut self, items: &[BatchSetItem]) -> Vec<BatchSetResult> {
        items
            .iter()
            .map(|item| BatchSetResult {
                key: item.key.clone(),
                success: self.set(&item.key, &item.value, &item.context),
            })
            .collect()
    }

    pub fn delete(&mut self, primary: &str, context: &CacheContext) -> bool {
        let key = generate_cache_key(primary, context);
        if self.remove_entry(&key).is_some() {
            self.emit(CacheEvent::CacheDelete { key });
            true
        } else {
            false
        }
    }

    /// Drop all entries and everything learned.
    pub fn clear(&mut self) {
        let entries_cleared = self.entries.len();
        self.entries.clear();
        self.lru.clear();
        self.memory_usage = 0;
        self.patterns.clear();
        self.predictions.clear();

        info!(entries_cleared, "Cache cleared");
        self.emit(CacheEvent::CacheCleared { entries_cleared });
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.counters.hits,
            misses: self.counters.misses,
            evictions: self.counters.evictions,
            total_requests: self.counters.total_requests,
            memory_usage: self.memory_usage,
            pattern_matches: self.counters.pattern_matches,
            average_access_time_ms: self.average_access_time_ms(),
            hit_rate: self.hit_rate(),
            size: self.entries.len(),
            pattern_cache_size: self.predictions.len(),
            pattern_kinds: self.patterns.kind_count(),
        }
    }

    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            size: self.entries.len(),
            max_size: self.config.max_entries,
            memory_usage: self.memory_usage,
            max_memory: self.config.max_memory_bytes(),
            hit_rate: self.hit_rate(),
            pattern_cache_size: self.predictions.len(),
            average_access_time_ms: self.average_access_time_ms(),
        }
    }

    /// Serialize live entries and learned predictions.
    pub fn export_snapshot(&self) -> Result<String> {
        let now = Utc::now();

        let mut cache = Vec::with_capacity(self.entries.len());
        for key in self.lru.values() {
            if let Some(entry) = self.entries.get(key) {
                if !entry.is_expired(self.config.ttl_ms, now) {
                    cache.push((key.clone(), serde_json::to_value(entry)?));
                }
            }
        }

        let mut patterns = Vec::with_capacity(self.predictions.len());
        for (key, value) in &self.predictions {
            if let Some(record) = self.patterns.get(key) {
                let prediction = PredictionSnapshot {
                    value: value.clone(),
                    confidence: self.patterns.confidence(&key.kind),
                    record: record.clone(),
                };
                patterns.push((key.to_string(), serde_json::to_value(&prediction)?));
            }
        }

        let snapshot = Snapshot {
            cache,
            patterns,
            statistics: Some(self.statistics()),
            timestamp: now.timestamp_millis(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Replace the cache contents with a snapshot.
    ///
    /// The document is parsed before anything is touched; a malformed document
    /// leaves the cache as it was. Individual bad or expired items are skipped.
    pub fn import_snapshot(&mut self, data: &str) -> Result<ImportReport> {
        let snapshot: Snapshot =
            serde_json::from_str(data).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        self.entries.clear();
        self.lru.clear();
        self.memory_usage = 0;
        self.patterns.clear();
        self.predictions.clear();

        let now = Utc::now();
        let max_memory = self.config.max_memory_bytes();
        let mut report = ImportReport::default();

        for (key, raw) in snapshot.cache {
            let mut entry: CacheEntry = match serde_json::from_value(raw) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping malformed snapshot entry");
                    report.skipped_malformed += 1;
                    continue;
                }
            };
            if entry.is_expired(self.config.ttl_ms, now) {
                report.skipped_expired += 1;
                continue;
            }

            entry.key = key;
            entry.size_bytes = entry
                .size_bytes
                .max(estimate_entry_size("", &entry.value));
            if entry.size_bytes > max_memory {
                report.rejected += 1;
                continue;
            }

            self.remove_entry(&entry.key);
            self.ensure_capacity(entry.size_bytes);
            self.insert_entry(entry);
            report.imported += 1;
        }

        let stale_before = self.stale_before(now);
        for (signature, raw) in snapshot.patterns {
            let prediction: PredictionSnapshot = match serde_json::from_value(raw) {
                Ok(prediction) => prediction,
                Err(e) => {
                    debug!(signature = %signature, error = %e, "Skipping malformed snapshot pattern");
                    report.skipped_malformed += 1;
                    continue;
                }
            };
            if stale_before.is_some_and(|cutoff| prediction.record.last_used < cutoff) {
                report.skipped_expired += 1;
                continue;
            }
            self.predictions
                .insert(prediction.record.pattern.key(), prediction.value);
            self.patterns.restore(prediction.record);
            report.patterns_imported += 1;
        }

        info!(
            imported = report.imported,
            patterns = report.patterns_imported,
            skipped_expired = report.skipped_expired,
            skipped_malformed = report.skipped_malformed,
            "Imported cache snapshot"
        );
        Ok(report)
    }

    /// Remove expired entries and predictions unused for longer than the TTL.
    pub fn sweep(&mut self) -> SweepReport {
        let now = Utc::now();
        let Some(cutoff) = self.stale_before(now) else {
            return SweepReport::default();
        };

        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(self.config.ttl_ms, now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }

        let stale = self.patterns.retain_recent(cutoff);
        for key in &stale {
            self.predictions.remove(key);
        }

        let report = SweepReport {
            expired_entries: expired.len(),
            expired_patterns: stale.len(),
        };
        if !report.is_empty() {
            info!(
                expired_entries = report.expired_entries,
                expired_patterns = report.expired_patterns,
                "Cache cleanup"
            );
            self.emit(CacheEvent::Cleanup {
                expired_entries: report.expired_entries,
                expired_patterns: report.expired_patterns,
            });
        }
        report
    }

    fn lookup_direct(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheLookup> {
        let expired = self.entries.get(key)?.is_expired(self.config.ttl_ms, now);
        if expired {
            self.remove_entry(key);
            self.emit(CacheEvent::CacheEviction {
                key: key.to_string(),
                reason: EvictionReason::Expired,
            });
            return None;
        }

        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        self.lru.remove(&entry.access_seq);
        entry.access_seq = seq;
        self.lru.insert(seq, key.to_string());

        entry.access_count += 1;
        entry.last_accessed_at = now;

        Some(CacheLookup {
            value: entry.value.clone(),
            metadata: LookupMetadata::Direct {
                created_at: entry.created_at,
                last_accessed_at: entry.last_accessed_at,
                access_count: entry.access_count,
                source: entry.source,
            },
        })
    }

    fn find_prediction(&mut self, context: &CacheContext) -> Option<CacheLookup> {
        let mut best: Option<(PatternKey, f64)> = None;
        for pattern in extract_patterns(None, &context.pattern_context()) {
            let key = pattern.key();
            if !self.predictions.contains_key(&key) {
                continue;
            }
            let confidence = self.patterns.confidence(&pattern.kind);
            if confidence < PATTERN_MATCH_THRESHOLD {
                continue;
            }
            if best.as_ref().is_none_or(|(_, c)| confidence > *c) {
                best = Some((key, confidence));
            }
        }

        let (key, confidence) = best?;
        self.patterns.touch(&key);
        let value = self.predictions.get(&key)?.clone();
        Some(CacheLookup {
            value,
            metadata: LookupMetadata::Pattern {
                pattern: key.to_string(),
                confidence,
            },
        })
    }

    fn learn(&mut self, value: &str, context: &CacheContext) {
        let patterns = extract_patterns(Some(value), &context.pattern_context());
        if patterns.is_empty() {
            return;
        }

        let mut learned = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            self.patterns.record_success(pattern);
            self.predictions.insert(pattern.key(), value.to_string());
            learned.push(pattern.key().to_string());
        }
        self.emit(CacheEvent::PatternLearned { patterns: learned });
    }

    fn ensure_capacity(&mut self, incoming: u64) {
        while self.entries.len() >= self.config.max_entries {
            if !self.evict_lru() {
                break;
            }
        }
        let max_memory = self.config.max_memory_bytes();
        while self.memory_usage + incoming > max_memory {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.lru.pop_first() else {
            return false;
        };
        if self.remove_entry(&key).is_none() {
            return false;
        }
        self.counters.evictions += 1;
        debug!(key = %key, "Evicted least recently used entry");
        self.emit(CacheEvent::CacheEviction {
            key,
            reason: EvictionReason::Lru,
        });
        true
    }

    fn insert_entry(&mut self, mut entry: CacheEntry) {
        let seq = self.next_seq();
        entry.access_seq = seq;
        self.lru.insert(seq, entry.key.clone());
        self.memory_usage += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.access_seq);
        self.memory_usage = self.memory_usage.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn next_seq(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn stale_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.config.ttl_ms == 0 {
            return None;
        }
        let ttl = i64::try_from(self.config.ttl_ms).ok()?;
        now.checked_sub_signed(ChronoDuration::try_milliseconds(ttl)?)
    }

    fn record_latency(&mut self, started: Instant) {
        self.latencies.push_back(started.elapsed());
        while self.latencies.len() > LATENCY_WINDOW {
            self.latencies.pop_front();
        }
    }

    fn average_access_time_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let total: Duration = self.latencies.iter().sum();
        total.as_secs_f64() * 1000.0 / self.latencies.len() as f64
    }

    fn hit_rate(&self) -> f64 {
        if self.counters.total_requests == 0 {
            0.0
        } else {
            self.counters.hits as f64 / self.counters.total_requests as f64
        }
    }

    fn emit(&self, event: CacheEvent) {
        trace!(event = event.name(), "Cache event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
