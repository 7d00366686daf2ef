//! # Segmentation
//!
//! Pluggable splitting of documents into ordered units and of units into
//! tokens. The default policy is a heuristic; callers with better linguistic
//! tooling supply their own [`SegmentationPolicy`].

use crate::types::DimdirError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Splits text for ingestion.
pub trait SegmentationPolicy: Send + Sync + fmt::Debug {
    /// Split a document into ordered unit texts. Empty units are dropped.
    fn split_units(&self, text: &str) -> Vec<String>;

    /// Split a unit into ordered tokens. Empty tokens are dropped.
    fn split_tokens(&self, text: &str) -> Vec<String>;
}

/// What counts as one unit of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Sentences ending in `.`, `?` or `!` followed by whitespace.
    #[default]
    Sentence,
    /// Blocks separated by a blank line.
    Paragraph,
    /// Pages separated by a form feed.
    Page,
}

impl FromStr for Granularity {
    type Err = DimdirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentence" => Ok(Self::Sentence),
            "paragraph" => Ok(Self::Paragraph),
            "page" => Ok(Self::Page),
            other => Err(DimdirError::InvalidContent(format!(
                "unknown granularity '{other}'"
            ))),
        }
    }
}

/// Heuristic segmenter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSegmenter {
    granularity: Granularity,
}

impl DefaultSegmenter {
    #[must_use]
    pub const fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }

    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }
}

/// True if the terminator at `chars[i]` closes an abbreviation such as
/// `e.g.` or `Mr.` rather than a sentence.
fn is_abbreviation(chars: &[char], i: usize) -> bool {
    if chars[i] != '.' {
        return false;
    }
    // e.g. / i.e.
    if i >= 3 && chars[i - 2] == '.' && chars[i - 1].is_alphanumeric() && chars[i - 3].is_alphanumeric() {
        return true;
    }
    // Mr. / Dr. at a word boundary
    i >= 2
        && chars[i - 2].is_uppercase()
        && chars[i - 1].is_lowercase()
        && (i == 2 || chars[i - 3].is_whitespace())
}

fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        let terminator = matches!(c, '.' | '?' | '!');
        let followed_by_space = chars.get(i + 1).is_some_and(|n| n.is_whitespace());
        if terminator && followed_by_space && !is_abbreviation(&chars, i) {
            push_trimmed(&mut out, &current);
            current.clear();
        }
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

impl SegmentationPolicy for DefaultSegmenter {
    fn split_units(&self, text: &str) -> Vec<String> {
        match self.granularity {
            Granularity::Sentence => split_sentences(text),
            Granularity::Paragraph => {
                let normalized = text.replace("\r\n", "\n");
                let mut out = Vec::new();
                for block in normalized.split("\n\n") {
                    push_trimmed(&mut out, block);
                }
                out
            }
            Granularity::Page => {
                let mut out = Vec::new();
                for page in text.split('\u{c}') {
                    push_trimmed(&mut out, page);
                }
                out
            }
        }
    }

    fn split_tokens(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}
