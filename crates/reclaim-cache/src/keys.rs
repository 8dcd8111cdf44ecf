//! Cache key normalization.

use crate::types::EntrySource;
use reclaim_patterns::{PatternContext, normalize_file_name};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a generated cache key in hex characters.
pub const KEY_LENGTH: usize = 32;

/// Context a value was recovered in. Only part of it feeds the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Who produced the entry. Not part of the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EntrySource>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_target_size(mut self, size: u64) -> Self {
        self.target_size = Some(size);
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_source(mut self, source: EntrySource) -> Self {
        self.source = Some(source);
        self
    }

    /// The subset of the context pattern extraction looks at.
    pub fn pattern_context(&self) -> PatternContext {
        PatternContext {
            file_name: self.file_name.clone(),
            file_size: self.target_size,
        }
    }
}

#[derive(Serialize)]
struct KeyData<'a> {
    primary: &'a str,
    target_size: u64,
    file_name: String,
    phase: &'a str,
    algorithm: &'a str,
}

/// Hash `primary` and the normalized context into a fixed-length key.
pub fn generate_cache_key(primary: &str, context: &CacheContext) -> String {
    let data = KeyData {
        primary,
        target_size: context.target_size.unwrap_or(0),
        file_name: context
            .file_name
            .as_deref()
            .map(normalize_file_name)
            .unwrap_or_default(),
        phase: context.phase.as_deref().unwrap_or("unknown"),
        algorithm: context.algorithm.as_deref().unwrap_or("default"),
    };

    // Serializing a struct of strings and integers cannot fail.
    let encoded = serde_json::to_vec(&data).unwrap_or_default();
    let hash = Sha256::digest(&encoded);
    let mut key = hex::encode(hash);
    key.truncate(KEY_LENGTH);
    key
}

/// Size estimate used against the memory budget.
///
/// Two bytes per UTF-16 code unit of key and value plus a fixed overhead.
pub fn estimate_entry_size(primary: &str, value: &str) -> u64 {
    let units = primary.encode_utf16().count() + value.encode_utf16().count();
    (units as u64) * 2 + 200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_fixed_length_hex() {
        let key = generate_cache_key("archive", &CacheContext::new());
        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_normalizes_file_name() {
        let a = CacheContext::new().with_file_name("/tmp/Report_2023.zip");
        let b = CacheContext::new().with_file_name("C:\\other\\report-2023.rar");
        assert_eq!(generate_cache_key("k", &a), generate_cache_key("k", &b));
    }

    #[test]
    fn test_key_depends_on_context() {
        let base = CacheContext::new().with_file_name("a.zip");
        let sized = base.clone().with_target_size(42);
        let phased = base.clone().with_phase("dictionary");
        let keys = [
            generate_cache_key("k", &base),
            generate_cache_key("k", &sized),
            generate_cache_key("k", &phased),
            generate_cache_key("other", &base),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_source_does_not_affect_key() {
        let plain = CacheContext::new().with_file_name("a.zip");
        let sourced = plain.clone().with_source(EntrySource::Batch);
        assert_eq!(generate_cache_key("k", &plain), generate_cache_key("k", &sourced));
    }

    #[test]
    fn test_explicit_defaults_match_missing_fields() {
        let explicit = CacheContext::new()
            .with_target_size(0)
            .with_phase("unknown")
            .with_algorithm("default");
        assert_eq!(
            generate_cache_key("k", &explicit),
            generate_cache_key("k", &CacheContext::new())
        );
    }

    #[test]
    fn test_entry_size_counts_utf16_units() {
        assert_eq!(estimate_entry_size("ab", "cd"), 208);
        assert_eq!(estimate_entry_size("", "😀"), 204);
    }
}
