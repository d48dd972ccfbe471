//! Reduce-side shuffle and merge
//!
//! [`ShuffleMerger`] is the single point where partial counts from all
//! aggregators meet. `submit` takes `&self` and may be called from any number
//! of threads at once; `finalize` consumes the merger, so no submission can
//! race with it. Both strategies give identical tallies for the same multiset
//! of partials, whatever order they arrive in.

use super::counts::{FinalTally, PartialCount};
use crate::config::MergeStrategy;
use crate::error::{Result, TallyError};
use crate::extract::Label;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Stable reduce partition for a label
///
/// Uses a 31-multiplier string hash so the assignment is identical across
/// runs and platforms.
pub fn partition_for(label: &Label, reducers: usize) -> usize {
    if reducers <= 1 {
        return 0;
    }
    let hash = label
        .as_str()
        .bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(b as i32));
    (hash & i32::MAX) as usize % reducers
}

pub struct ShuffleMerger {
    strategy: MergeStrategy,
    reducers: usize,
    partitions: Vec<Mutex<PartialCount>>,
    queue: Mutex<Vec<PartialCount>>,
    submitted: AtomicUsize,
}

impl ShuffleMerger {
    pub fn new(strategy: MergeStrategy, reducers: usize) -> Self {
        let reducers = reducers.max(1);
        let partitions = match strategy {
            MergeStrategy::Partitioned => (0..reducers)
                .map(|_| Mutex::new(PartialCount::new()))
                .collect(),
            MergeStrategy::Tree => Vec::new(),
        };

        Self {
            strategy,
            reducers,
            partitions,
            queue: Mutex::new(Vec::new()),
            submitted: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Number of partials accepted so far
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Hand off one aggregator's partial count
    pub fn submit(&self, partial: PartialCount) -> Result<()> {
        match self.strategy {
            MergeStrategy::Partitioned => self.submit_partitioned(partial)?,
            MergeStrategy::Tree => self
                .queue
                .lock()
                .map_err(|_| poisoned("tree queue"))?
                .push(partial),
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn submit_partitioned(&self, partial: PartialCount) -> Result<()> {
        // Route outside the locks so each partition is held only for its own keys
        let mut routed: BTreeMap<usize, PartialCount> = BTreeMap::new();
        for (label, n) in partial.into_inner() {
            routed
                .entry(partition_for(&label, self.reducers))
                .or_default()
                .add(label, n)?;
        }

        for (index, share) in routed {
            let mut target = self.partitions[index]
                .lock()
                .map_err(|_| poisoned("partition"))?;
            let current = std::mem::take(&mut *target);
            *target = current.combine(share)?;
        }
        Ok(())
    }

    /// Combine everything submitted into the final tally
    pub fn finalize(self) -> Result<FinalTally> {
        let submitted = self.submitted();
        let merged = match self.strategy {
            MergeStrategy::Partitioned => {
                let mut merged = BTreeMap::new();
                for partition in self.partitions {
                    let counts = partition
                        .into_inner()
                        .map_err(|_| poisoned("partition"))?;
                    // Partitions hold disjoint label sets
                    merged.extend(counts.into_inner());
                }
                merged
            }
            MergeStrategy::Tree => {
                let queue = self.queue.into_inner().map_err(|_| poisoned("tree queue"))?;
                tree_combine(queue)?.into_inner()
            }
        };

        debug!(
            "Merged {} partial count(s) into {} label(s) using {:?}",
            submitted,
            merged.len(),
            self.strategy
        );
        Ok(FinalTally::from_map(merged))
    }
}

/// Pairwise combination, level by level
pub fn tree_combine(mut level: Vec<PartialCount>) -> Result<PartialCount> {
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut pending = level.into_iter();
        while let Some(left) = pending.next() {
            match pending.next() {
                Some(right) => next.push(left.combine(right)?),
                None => next.push(left),
            }
        }
        level = next;
    }
    Ok(level.pop().unwrap_or_default())
}

fn poisoned(what: &str) -> TallyError {
    TallyError::MergeFailure {
        reason: format!("{what} lock poisoned by a panicking submitter"),
    }
}
