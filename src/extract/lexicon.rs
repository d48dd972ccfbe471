//! Word-list based extraction from review text

use super::{Label, LabelExtractor};
use crate::record::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("Valid regex pattern"));

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "best", "love", "loved", "loves", "excellent", "fantastic", "good",
    "great", "happy", "nice", "perfect", "recommend", "satisfied", "wonderful", "works",
];

const NEGATIVE_WORDS: &[&str] = &[
    "awful", "bad", "broken", "defective", "disappointed", "disappointing", "hate", "horrible",
    "junk", "poor", "refund", "return", "returned", "terrible", "useless", "waste", "worst",
];

const NEGATORS: &[&str] = &["not", "no", "never", "hardly"];

/// Scores review text against positive and negative word lists
///
/// A negator ("not", "never", anything ending in "n't") flips the polarity of
/// the next scored word. Text with no words at all is `unlabeled`.
#[derive(Debug, Clone)]
pub struct LexiconExtractor {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

impl Default for LexiconExtractor {
    fn default() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().map(|w| w.to_string()).collect(),
            negative: NEGATIVE_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl LexiconExtractor {
    /// Extend the built-in lists
    pub fn with_words(mut self, positive: &[String], negative: &[String]) -> Self {
        self.positive
            .extend(positive.iter().map(|w| w.to_lowercase()));
        self.negative
            .extend(negative.iter().map(|w| w.to_lowercase()));
        self
    }

    fn score(&self, text: &str) -> Option<i64> {
        let lowered = text.to_lowercase();
        let mut score = 0i64;
        let mut tokens = 0usize;
        let mut negate = false;

        for word in WORD_REGEX.find_iter(&lowered).map(|m| m.as_str()) {
            tokens += 1;
            let polarity = if self.positive.contains(word) {
                1
            } else if self.negative.contains(word) {
                -1
            } else {
                if NEGATORS.contains(&word) || word.ends_with("n't") {
                    negate = true;
                }
                continue;
            };
            score += if negate { -polarity } else { polarity };
            negate = false;
        }

        (tokens > 0).then_some(score)
    }
}

impl LabelExtractor for LexiconExtractor {
    fn extract(&self, record: &Record) -> Label {
        match self.score(record.text()) {
            None => Label::unlabeled(),
            Some(s) if s > 0 => Label::positive(),
            Some(s) if s < 0 => Label::negative(),
            Some(_) => Label::neutral(),
        }
    }
}
