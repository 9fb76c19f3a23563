//! Whole-word caption matching applied after SQL filtering
//!
//! SQL `LIKE` finds "fox" inside "foxglove" and is case-sensitive for
//! non-ASCII text. Captions are split into sentence-like segments and the
//! term must appear as a whole word inside one of them.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{MediaError, Result};

/// Character class members that count as part of a word
const WORD_CHARS: &str = r"\p{L}\p{N}_";

fn sentence_splitter() -> &'static Regex {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"[.!?]+(?:\s+|$)|[\r\n]+").expect("static regex"))
}

/// Split caption text into sentence-like segments
pub fn segments(caption: &str) -> impl Iterator<Item = &str> {
    sentence_splitter()
        .split(caption)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Compiled matcher for one search term
#[derive(Debug, Clone)]
pub struct CaptionMatcher {
    term: String,
    pattern: Option<Regex>,
}

impl CaptionMatcher {
    /// Compile a term. Blank terms match every caption.
    pub fn new(term: &str) -> Result<Self> {
        let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
        if words.is_empty() {
            return Ok(Self {
                term: String::new(),
                pattern: None,
            });
        }

        let source = format!(
            r"(?i)(?:^|[^{chars}]){body}(?:$|[^{chars}])",
            chars = WORD_CHARS,
            body = words.join(r"\s+")
        );
        let pattern = Regex::new(&source)
            .map_err(|e| MediaError::Validation(format!("invalid caption term {:?}: {}", term, e)))?;

        Ok(Self {
            term: term.trim().to_string(),
            pattern: Some(pattern),
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    /// True when the term appears as a whole word in one caption segment
    pub fn matches(&self, caption: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => segments(caption).any(|segment| pattern.is_match(segment)),
        }
    }
}

/// One-shot form of [`CaptionMatcher::matches`]
pub fn matches(caption: &str, term: &str) -> bool {
    match CaptionMatcher::new(term) {
        Ok(matcher) => matcher.matches(caption),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_word_match() {
        assert!(matches("A red fox jumps.", "fox"));
        assert!(!matches("A red foxglove.", "fox"));
        assert!(!matches("The firefox browser.", "fox"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(matches("FOX at dusk", "fox"));
        assert!(matches("Ärger im Büro.", "ärger"));
    }

    #[test]
    fn test_empty_term_matches_everything() {
        assert!(matches("anything at all", ""));
        assert!(matches("", "   "));
        assert!(CaptionMatcher::new("").unwrap().is_empty());
    }

    #[test]
    fn test_phrase_does_not_cross_sentences() {
        assert!(matches("The red fox. It ran.", "red fox"));
        assert!(!matches("It was red. Fox ran away.", "red fox"));
        assert!(matches("a red   fox", "red fox"));
    }

    #[test]
    fn test_punctuation_inside_terms() {
        assert!(matches("Shot on 3.5mm lens", "3.5mm"));
        assert!(matches("written in c++, mostly", "c++"));
        assert!(matches("fox, wolf and bear", "wolf"));
    }

    #[test]
    fn test_segments() {
        let parts: Vec<&str> = segments("One. Two!  Three?\nFour").collect();
        assert_eq!(parts, vec!["One", "Two", "Three", "Four"]);
    }
}
