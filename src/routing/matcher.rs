//! Segment matching logic.
//!
//! # Responsibilities
//! - Match a literal rule segment (case-insensitive, whole segment)
//! - Match a named segment against its regex requirement
//!
//! # Design Decisions
//! - Literal segments are compared as text, never interpreted as regex
//! - Requirements are anchored so they must cover the whole segment
//! - Unconstrained named segments have no matcher (they accept anything)

use regex::Regex;

/// Trait for matching a single path segment.
pub trait SegmentMatcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the segment satisfies this condition.
    fn matches(&self, segment: &str) -> bool;
}

/// Matches a fixed rule segment.
#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    expected: String,
}

impl LiteralMatcher {
    /// Create a new literal matcher.
    /// The text is normalized to lowercase for case-insensitive matching.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            expected: text.into().to_lowercase(),
        }
    }
}

impl SegmentMatcher for LiteralMatcher {
    fn matches(&self, segment: &str) -> bool {
        segment.to_lowercase() == self.expected
    }
}

/// Matches a named segment against a requirement regex.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compile a requirement. The pattern is anchored to the whole segment.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self { regex })
    }
}

impl SegmentMatcher for PatternMatcher {
    fn matches(&self, segment: &str) -> bool {
        self.regex.is_match(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_matcher() {
        let matcher = LiteralMatcher::new("Blog");
        assert!(matcher.matches("blog"));
        assert!(matcher.matches("BLOG")); // Case insensitive
        assert!(!matcher.matches("blogs"));
        assert!(!matcher.matches("b.og"));
    }

    #[test]
    fn test_literal_is_not_a_regex() {
        let matcher = LiteralMatcher::new("a.c");
        assert!(matcher.matches("A.C"));
        assert!(!matcher.matches("abc"));
    }

    #[test]
    fn test_pattern_matcher_is_anchored() {
        let matcher = PatternMatcher::new("[0-9]+").unwrap();
        assert!(matcher.matches("42"));
        assert!(!matcher.matches("42a"));
        assert!(!matcher.matches("a42"));

        let alt = PatternMatcher::new("en|es").unwrap();
        assert!(alt.matches("es"));
        assert!(!alt.matches("ens"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(PatternMatcher::new("[0-9").is_err());
    }
}
