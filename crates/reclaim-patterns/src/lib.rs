//! Pattern learning for recovered secrets.
//!
//! Turns a recovered value (plus whatever is known about the artifact it came
//! from) into typed signatures, and keeps per-signature attempt/success counts
//! so callers can ask how much a signature should be trusted.

pub mod extract;
pub mod pattern;
pub mod store;

pub use extract::{extract_patterns, normalize_file_name};
pub use pattern::{Pattern, PatternAttributes, PatternContext, PatternKey, PatternKind, SizeBucket};
pub use store::{LearnedPattern, PatternRecord, PatternStore, confidence_score};

/// Success rate assumed for a pattern kind with no recorded attempts.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Observation count at which confidence stops growing.
pub const SATURATION_OBSERVATIONS: u64 = 10;

/// Lower clamp for confidence scores.
pub const MIN_CONFIDENCE: f64 = 0.1;

/// Upper clamp for confidence scores.
pub const MAX_CONFIDENCE: f64 = 0.9;
