//! Star-rating based extraction

use super::{Label, LabelExtractor};
use crate::record::Record;

/// Rating boundaries for the positive and negative buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingThresholds {
    pub positive_at_least: f64,
    pub negative_at_most: f64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self {
            positive_at_least: 4.0,
            negative_at_most: 2.0,
        }
    }
}

/// Labels a record from its numeric rating alone
///
/// Records without a finite rating are `unlabeled`; anything strictly between
/// the two thresholds is `neutral`.
#[derive(Debug, Clone, Default)]
pub struct RatingExtractor {
    thresholds: RatingThresholds,
}

impl RatingExtractor {
    pub fn new(thresholds: RatingThresholds) -> Self {
        Self { thresholds }
    }
}

impl LabelExtractor for RatingExtractor {
    fn extract(&self, record: &Record) -> Label {
        match record.rating() {
            Some(r) if !r.is_finite() => Label::unlabeled(),
            Some(r) if r >= self.thresholds.positive_at_least => Label::positive(),
            Some(r) if r <= self.thresholds.negative_at_most => Label::negative(),
            Some(_) => Label::neutral(),
            None => Label::unlabeled(),
        }
    }
}
