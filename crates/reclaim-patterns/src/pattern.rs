//! Pattern types.

use reclaim_core::job::CharClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Family a pattern belongs to. Open-ended through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Length,
    Charset,
    Format,
    Filename,
    Filesize,
    Other(String),
}

impl PatternKind {
    pub fn as_str(&self) -> &str {
        match self {
            PatternKind::Length => "length",
            PatternKind::Charset => "charset",
            PatternKind::Format => "format",
            PatternKind::Filename => "filename",
            PatternKind::Filesize => "filesize",
            PatternKind::Other(name) => name,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact size buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
    Xlarge,
}

impl SizeBucket {
    const MIB: u64 = 1024 * 1024;

    pub fn of(size_bytes: u64) -> Self {
        if size_bytes < Self::MIB {
            SizeBucket::Small
        } else if size_bytes < 10 * Self::MIB {
            SizeBucket::Medium
        } else if size_bytes < 100 * Self::MIB {
            SizeBucket::Large
        } else {
            SizeBucket::Xlarge
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
            SizeBucket::Xlarge => "xlarge",
        }
    }
}

/// Kind-specific description of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternAttributes {
    Length { min_length: u32, max_length: u32 },
    Charset { charset: Vec<CharClass> },
    Format { formats: Vec<String> },
    Filename { name: String },
    Filesize { bucket: SizeBucket },
    Other(BTreeMap<String, String>),
}

/// Deduplication key of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternKey {
    pub kind: PatternKind,
    pub signature: String,
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.signature)
    }
}

/// A learned signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub signature: String,
    pub attributes: PatternAttributes,
}

impl Pattern {
    pub fn length(len: u32) -> Self {
        Self {
            kind: PatternKind::Length,
            signature: format!("len_{len}"),
            attributes: PatternAttributes::Length {
                min_length: len,
                max_length: len,
            },
        }
    }

    /// Charset pattern; classes are sorted and deduplicated.
    pub fn charset(classes: impl IntoIterator<Item = CharClass>) -> Self {
        let mut charset: Vec<CharClass> = classes.into_iter().collect();
        charset.sort();
        charset.dedup();
        let signature = charset
            .iter()
            .map(CharClass::as_str)
            .collect::<Vec<_>>()
            .join("_");
        Self {
            kind: PatternKind::Charset,
            signature,
            attributes: PatternAttributes::Charset { charset },
        }
    }

    pub fn format(signature: impl Into<String>, formats: &[&str]) -> Self {
        Self {
            kind: PatternKind::Format,
            signature: signature.into(),
            attributes: PatternAttributes::Format {
                formats: formats.iter().map(|f| f.to_string()).collect(),
            },
        }
    }

    pub fn filename(normalized: impl Into<String>) -> Self {
        let name = normalized.into();
        Self {
            kind: PatternKind::Filename,
            signature: format!("filename_{name}"),
            attributes: PatternAttributes::Filename { name },
        }
    }

    pub fn filesize(bucket: SizeBucket) -> Self {
        Self {
            kind: PatternKind::Filesize,
            signature: format!("filesize_{}", bucket.as_str()),
            attributes: PatternAttributes::Filesize { bucket },
        }
    }

    pub fn key(&self) -> PatternKey {
        PatternKey {
            kind: self.kind.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// What is known about the artifact a value was recovered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternContext {
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

impl PatternContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_file_size(mut self, file_size: u64) -> Self {
        self.file_size = Some(file_size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_signature_is_sorted() {
        let pattern = Pattern::charset([CharClass::Uppercase, CharClass::Numbers, CharClass::Lowercase]);
        assert_eq!(pattern.signature, "lowercase_numbers_uppercase");
    }

    #[test]
    fn test_size_buckets() {
        assert_eq!(SizeBucket::of(0), SizeBucket::Small);
        assert_eq!(SizeBucket::of(1024 * 1024), SizeBucket::Medium);
        assert_eq!(SizeBucket::of(50 * 1024 * 1024), SizeBucket::Large);
        assert_eq!(SizeBucket::of(100 * 1024 * 1024), SizeBucket::Xlarge);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(Pattern::length(6).key().to_string(), "length:len_6");
        assert_eq!(
            Pattern::filesize(SizeBucket::Small).key().to_string(),
            "filesize:filesize_small"
        );
    }
}
