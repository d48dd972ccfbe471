//! Label extraction
//!
//! A [`LabelExtractor`] maps one record to one label. Extractors are total:
//! when no polarity can be derived they return [`Label::unlabeled`] instead of
//! failing, so a single odd record never aborts a job. They hold no mutable
//! state and are shared across aggregator threads without locking.

pub mod lexicon;
pub mod rating;

pub use lexicon::LexiconExtractor;
pub use rating::{RatingExtractor, RatingThresholds};

use crate::config::{ExtractorKind, TallyConfig};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const POSITIVE: &str = "positive";
pub const NEGATIVE: &str = "negative";
pub const NEUTRAL: &str = "neutral";
pub const UNLABELED: &str = "unlabeled";

/// Sentiment polarity label
///
/// Ordering is lexicographic on the label text, which is the order results
/// are written in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn positive() -> Self {
        Self::new(POSITIVE)
    }

    pub fn negative() -> Self {
        Self::new(NEGATIVE)
    }

    pub fn neutral() -> Self {
        Self::new(NEUTRAL)
    }

    /// Sentinel for records no polarity could be derived from
    pub fn unlabeled() -> Self {
        Self::new(UNLABELED)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unlabeled(&self) -> bool {
        self.0 == UNLABELED
    }

    /// Whether the label can be written as the first field of a
    /// `<label>\t<count>` line
    pub fn is_writable(&self) -> bool {
        !self.0.is_empty() && !self.0.contains(['\t', '\n', '\r'])
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Pure, total mapping from a record to its label
pub trait LabelExtractor: Send + Sync {
    fn extract(&self, record: &Record) -> Label;
}

impl<T: LabelExtractor + ?Sized> LabelExtractor for Arc<T> {
    fn extract(&self, record: &Record) -> Label {
        (**self).extract(record)
    }
}

/// Adapter for externally supplied extraction rules
pub struct FnExtractor<F>(F);

impl<F> FnExtractor<F>
where
    F: Fn(&Record) -> Label + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> LabelExtractor for FnExtractor<F>
where
    F: Fn(&Record) -> Label + Send + Sync,
{
    fn extract(&self, record: &Record) -> Label {
        (self.0)(record)
    }
}

/// Uses the rating when a record carries one and falls back to the text
pub struct HybridExtractor {
    rating: RatingExtractor,
    lexicon: LexiconExtractor,
}

impl HybridExtractor {
    pub fn new(rating: RatingExtractor, lexicon: LexiconExtractor) -> Self {
        Self { rating, lexicon }
    }
}

impl LabelExtractor for HybridExtractor {
    fn extract(&self, record: &Record) -> Label {
        match record.rating() {
            Some(r) if r.is_finite() => self.rating.extract(record),
            _ => self.lexicon.extract(record),
        }
    }
}

/// Build the extractor selected by the configuration
pub fn from_config(config: &TallyConfig) -> Arc<dyn LabelExtractor> {
    let thresholds = RatingThresholds {
        positive_at_least: config.positive_rating,
        negative_at_most: config.negative_rating,
    };
    let lexicon = || {
        LexiconExtractor::default().with_words(&config.extra_positive, &config.extra_negative)
    };

    match config.extractor {
        ExtractorKind::Rating => Arc::new(RatingExtractor::new(thresholds)),
        ExtractorKind::Lexicon => Arc::new(lexicon()),
        ExtractorKind::Hybrid => Arc::new(HybridExtractor::new(
            RatingExtractor::new(thresholds),
            lexicon(),
        )),
    }
}
