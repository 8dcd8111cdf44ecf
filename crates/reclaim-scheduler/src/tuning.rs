//! Applying learned patterns to a job's search configuration.

use reclaim_core::job::{AttackConfig, MAX_CANDIDATE_LENGTH};
use reclaim_patterns::{PatternAttributes, PatternKey, PatternKind, PatternStore};
use std::collections::HashSet;

/// Patterns at or below this success rate are ignored.
pub const MIN_APPLY_SUCCESS_RATE: f64 = 0.3;

/// Rewrite `config` with the best learned pattern of each applicable kind.
///
/// Returns the keys of the patterns that were applied.
pub fn apply_learned_patterns(config: &mut AttackConfig, store: &PatternStore) -> Vec<PatternKey> {
    let mut seen_kinds = HashSet::new();
    let mut applied = Vec::new();

    // Sorted best first, so the first pattern of each kind wins.
    for learned in store.top_patterns() {
        if learned.success_rate <= MIN_APPLY_SUCCESS_RATE {
            break;
        }
        let pattern = &learned.pattern;
        if !seen_kinds.insert(pattern.kind.clone()) {
            continue;
        }

        let used = match (&pattern.kind, &pattern.attributes) {
            (
                PatternKind::Length,
                PatternAttributes::Length {
                    min_length,
                    max_length,
                },
            ) => {
                config.min_length = min_length.saturating_sub(1).max(1);
                config.max_length = (max_length + 1).min(MAX_CANDIDATE_LENGTH);
                if config.min_length > config.max_length {
                    config.min_length = config.max_length;
                }
                true
            }
            (PatternKind::Charset, PatternAttributes::Charset { charset }) if !charset.is_empty() => {
                config.charset = charset.clone();
                true
            }
            (PatternKind::Format, PatternAttributes::Format { formats }) => {
                config.custom_patterns = formats.clone();
                true
            }
            _ => false,
        };

        if used {
            applied.push(pattern.key());
        }
    }

    applied
}

/// Put `value` at the front of the candidate list.
pub fn prepend_candidate(config: &mut AttackConfig, value: &str) {
    config.candidates.retain(|c| c != value);
    config.candidates.insert(0, value.to_string());
}
