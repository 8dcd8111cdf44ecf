//! Signature extraction.

use crate::pattern::{Pattern, PatternContext, SizeBucket};
use reclaim_core::job::CharClass;
use std::collections::BTreeSet;

/// Derive every pattern `value` and `context` support.
///
/// Value-derived patterns (length, charset, format) need a value; context
/// patterns (filename, filesize) are produced on their own, which is what the
/// cache relies on when it tries to answer a miss.
pub fn extract_patterns(value: Option<&str>, context: &PatternContext) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    if let Some(value) = value.filter(|v| !v.is_empty()) {
        patterns.push(Pattern::length(value.chars().count() as u32));

        let classes: BTreeSet<CharClass> = value.chars().map(CharClass::of).collect();
        patterns.push(Pattern::charset(classes));

        if let Some(format) = format_pattern(value) {
            patterns.push(format);
        }
    }

    if let Some(name) = context.file_name.as_deref() {
        let normalized = normalize_file_name(name);
        if !normalized.is_empty() {
            patterns.push(Pattern::filename(normalized));
        }
    }

    if let Some(size) = context.file_size.filter(|s| *s > 0) {
        patterns.push(Pattern::filesize(SizeBucket::of(size)));
    }

    patterns
}

fn format_pattern(value: &str) -> Option<Pattern> {
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match value.len() {
        4 => Some(Pattern::format("year_4digit", &["YYYY"])),
        6 => Some(Pattern::format("date_6digit", &["YYMMDD", "DDMMYY"])),
        8 => Some(Pattern::format("date_8digit", &["YYYYMMDD", "DDMMYYYY"])),
        _ => None,
    }
}

/// Reduce a file name to its comparable stem.
///
/// Keeps the last path component, drops the final extension, lower-cases and
/// strips everything outside `[a-z0-9]`.
pub fn normalize_file_name(file_name: &str) -> String {
    let base = reclaim_core::job::file_name_of(file_name);
    let stem = match base.rfind('.') {
        Some(idx) => &base[..idx],
        None => base,
    };
    stem.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}
