//! Result sinks
//!
//! Output is written in a fixed order (lexicographic by label within each
//! reduce partition) so identical tallies always serialize to identical bytes.

pub mod file;

pub use file::FileSink;

use crate::error::Result;
use crate::extract::Label;
use crate::mapreduce::{partition_for, FinalTally};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What a sink produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkReport {
    pub files: Vec<PathBuf>,
    /// Number of `<label>\t<count>` lines written across all files
    pub lines: usize,
}

pub trait ResultSink: Send + Sync {
    /// Fail fast, before any input is read, if the output cannot be written
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Persist the tally; all or nothing
    fn write(&self, tally: &FinalTally) -> Result<SinkReport>;
}

/// Pure: split the tally into per-reducer rows, adding zero rows for
/// `report_zero` labels that were never observed
pub fn partition_rows(
    tally: &FinalTally,
    reducers: usize,
    report_zero: &[Label],
) -> Vec<BTreeMap<Label, u64>> {
    let reducers = reducers.max(1);
    let mut partitions = vec![BTreeMap::new(); reducers];

    for (label, count) in tally.iter() {
        partitions[partition_for(label, reducers)].insert(label.clone(), count);
    }
    for label in report_zero {
        if tally.get(label).is_none() {
            partitions[partition_for(label, reducers)].insert(label.clone(), 0);
        }
    }

    partitions
}

/// Pure: serialize rows as `<label>\t<count>\n` lines
pub fn render_rows(rows: &BTreeMap<Label, u64>) -> String {
    rows.iter()
        .map(|(label, count)| format!("{label}\t{count}\n"))
        .collect()
}
