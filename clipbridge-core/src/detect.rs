//! Pattern detection for clipboard content.
//!
//! Classifies captured text against a configurable set of code-shaped
//! patterns. The canonical pattern matches access codes like `CLOUD123!`:
//! 4-8 uppercase letters, 2-3 digits, one closing symbol. Patterns are
//! configuration, not code: new code formats are added as [`PatternSpec`]s.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::TAG_ACCESS_CODE;

/// Canonical access-code shape. The letter run must start at a word
/// boundary so longer uppercase runs are rejected; there is deliberately no
/// trailing boundary since the closing symbol is usually followed by
/// whitespace or end of input, where `\b` can never match.
pub const ACCESS_CODE_PATTERN: &str = r"\b[A-Z]{4,8}[0-9]{2,3}[!@#$%^&*+=?~]";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid pattern {name:?}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// A named, taggable pattern definition, loadable from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    /// Tag applied to items matching this pattern.
    pub tag: String,
    pub regex: String,
}

struct CompiledPattern {
    tag: String,
    regex: Regex,
}

/// Outcome of classifying one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub matched: bool,
    pub tags: BTreeSet<String>,
    /// The matched substring of the first matching pattern.
    pub extracted: Option<String>,
}

impl Classification {
    fn unmatched() -> Self {
        Self {
            matched: false,
            tags: BTreeSet::new(),
            extracted: None,
        }
    }
}

/// An ordered set of classification patterns. First match wins; a capture
/// holding several codes yields only the first (documented limitation).
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PatternSet {
    /// The canonical access-code pattern only.
    pub fn with_defaults() -> Self {
        static DEFAULT: Lazy<Regex> =
            Lazy::new(|| Regex::new(ACCESS_CODE_PATTERN).expect("canonical pattern compiles"));
        Self {
            patterns: vec![CompiledPattern {
                tag: TAG_ACCESS_CODE.to_string(),
                regex: DEFAULT.clone(),
            }],
        }
    }

    /// Compile user-supplied patterns, rejecting invalid regexes up front.
    pub fn from_specs(specs: &[PatternSpec]) -> Result<Self, DetectError> {
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            let regex = Regex::new(&spec.regex).map_err(|source| DetectError::InvalidPattern {
                name: spec.name.clone(),
                source,
            })?;
            patterns.push(CompiledPattern {
                tag: spec.tag.clone(),
                regex,
            });
        }
        Ok(Self { patterns })
    }

    /// Classify raw clipboard text. Side-effect-free; arbitrary input is
    /// never an error, it simply does not match.
    pub fn classify(&self, content: &str) -> Classification {
        for pattern in &self.patterns {
            if let Some(m) = pattern.regex.find(content) {
                let mut tags = BTreeSet::new();
                tags.insert(pattern.tag.clone());
                return Classification {
                    matched: true,
                    tags,
                    extracted: Some(m.as_str().to_string()),
                };
            }
        }
        Classification::unmatched()
    }
}

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+|www\.[^\s]+").unwrap());

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").unwrap());

static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap());

/// Cheap structural tags for query convenience. These never drive sync;
/// only the pattern set's tags do.
pub fn auxiliary_tags(content: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if URL_REGEX.is_match(content) {
        tags.insert("url".to_string());
    }
    if EMAIL_REGEX.is_match(content) {
        tags.insert("email".to_string());
    }
    if PHONE_REGEX.is_match(content) {
        tags.insert("phone".to_string());
    }
    tags
}
