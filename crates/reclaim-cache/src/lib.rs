//! Adaptive candidate cache for Reclaim.
//!
//! A bounded, TTL-aware LRU cache of recovered values keyed by a hash of the
//! normalized job context. Values are also fed to a pattern layer, which can
//! answer a miss when the artifact looks like ones seen before.

pub mod config;
pub mod keys;
pub mod store;
pub mod sweeper;
pub mod types;

use std::sync::Arc;
use tokio::sync::RwLock;

pub use config::CacheConfig;
pub use keys::{CacheContext, KEY_LENGTH, estimate_entry_size, generate_cache_key};
pub use store::{CandidateCache, PATTERN_MATCH_THRESHOLD};
pub use sweeper::{CacheSweeper, SweeperHandle};
pub use types::{
    BatchSetItem, BatchSetResult, CacheEntry, CacheInfo, CacheLookup, CacheStatistics,
    EntrySource, ImportReport, LookupMetadata, PredictionSnapshot, Snapshot, SweepReport,
};

/// Cache handle shared between the scheduler, the sweeper and callers.
pub type SharedCache = Arc<RwLock<CandidateCache>>;

/// Wrap a cache for shared use.
pub fn shared(cache: CandidateCache) -> SharedCache {
    Arc::new(RwLock::new(cache))
}
