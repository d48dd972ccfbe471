//! Map-side local aggregation
//!
//! One aggregator run consumes exactly one chunk and emits exactly one
//! [`PartialCount`], only after the chunk is exhausted. A failed chunk is
//! retried from scratch by the orchestrator; there is no partial emission.

use super::counts::PartialCount;
use crate::error::Result;
use crate::extract::LabelExtractor;
use crate::record::Record;
use std::sync::Arc;
use tracing::{debug, trace};

/// Everything one chunk produced
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub chunk_id: usize,
    pub counts: PartialCount,
    /// Records successfully read and labelled
    pub records: u64,
    /// Malformed records that were skipped
    pub dropped: u64,
}

#[derive(Clone)]
pub struct LocalAggregator {
    extractor: Arc<dyn LabelExtractor>,
}

impl LocalAggregator {
    pub fn new(extractor: Arc<dyn LabelExtractor>) -> Self {
        Self { extractor }
    }

    /// Fold a chunk's records into label counts
    ///
    /// Malformed records are absorbed and counted as dropped. Any other error
    /// aborts the chunk and no partial result is returned.
    pub fn aggregate<I>(&self, chunk_id: usize, records: I) -> Result<ChunkOutput>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut counts = PartialCount::new();
        let mut read = 0u64;
        let mut dropped = 0u64;

        for item in records {
            match item {
                Ok(record) => {
                    let label = self.extractor.extract(&record);
                    trace!("chunk {} labelled record as {}", chunk_id, label);
                    counts.increment(label)?;
                    read = read.saturating_add(1);
                }
                Err(e) if e.is_recoverable() => {
                    debug!("chunk {} dropped record: {}", chunk_id, e);
                    dropped = dropped.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "chunk {} aggregated {} record(s) into {} label(s), {} dropped",
            chunk_id,
            read,
            counts.len(),
            dropped
        );

        Ok(ChunkOutput {
            chunk_id,
            counts,
            records: read,
            dropped,
        })
    }
}
