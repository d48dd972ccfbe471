//! Count maps exchanged between the map and reduce sides
//!
//! All arithmetic is checked: a count that would exceed `u64::MAX` is a
//! `CountOverflow` error, never a wrapped value.

use crate::error::{Result, TallyError};
use crate::extract::Label;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-chunk label counts
///
/// Only labels that were observed are present; there are no zero entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialCount {
    counts: BTreeMap<Label, u64>,
}

impl PartialCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, label: Label) -> Result<()> {
        self.add(label, 1)
    }

    /// Add `n` occurrences of `label`; adding zero records nothing
    pub fn add(&mut self, label: Label, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let updated = self
            .get(&label)
            .checked_add(n)
            .ok_or_else(|| TallyError::CountOverflow {
                label: label.to_string(),
            })?;
        self.counts.insert(label, updated);
        Ok(())
    }

    /// Pairwise sum of matching labels
    ///
    /// Commutative and associative, so the order partials are combined in
    /// never changes the result.
    pub fn combine(mut self, other: PartialCount) -> Result<PartialCount> {
        if self.counts.len() < other.counts.len() {
            return other.combine(self);
        }
        for (label, n) in other.counts {
            self.add(label, n)?;
        }
        Ok(self)
    }

    pub fn get(&self, label: &Label) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of labelled records
    pub fn total(&self) -> Result<u64> {
        checked_total(&self.counts)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, u64)> {
        self.counts.iter().map(|(label, n)| (label, *n))
    }

    pub(crate) fn into_inner(self) -> BTreeMap<Label, u64> {
        self.counts
    }
}

impl FromIterator<(Label, u64)> for PartialCount {
    /// Collect without overflow checks; intended for building fixtures
    fn from_iter<I: IntoIterator<Item = (Label, u64)>>(iter: I) -> Self {
        let mut counts = BTreeMap::new();
        for (label, n) in iter {
            if n > 0 {
                let slot = counts.entry(label).or_insert(0u64);
                *slot = slot.saturating_add(n);
            }
        }
        Self { counts }
    }
}

/// Corpus-wide totals, immutable once built
///
/// Iteration is in lexicographic label order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalTally {
    counts: BTreeMap<Label, u64>,
}

impl FinalTally {
    pub(crate) fn from_map(counts: BTreeMap<Label, u64>) -> Self {
        Self { counts }
    }

    pub fn get(&self, label: &Label) -> Option<u64> {
        self.counts.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> Result<u64> {
        checked_total(&self.counts)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, u64)> {
        self.counts.iter().map(|(label, n)| (label, *n))
    }
}

impl From<PartialCount> for FinalTally {
    fn from(partial: PartialCount) -> Self {
        Self::from_map(partial.into_inner())
    }
}

fn checked_total(counts: &BTreeMap<Label, u64>) -> Result<u64> {
    counts.iter().try_fold(0u64, |acc, (label, n)| {
        acc.checked_add(*n).ok_or_else(|| TallyError::CountOverflow {
            label: label.to_string(),
        })
    })
}
