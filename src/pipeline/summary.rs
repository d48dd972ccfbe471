//! Job counters reported after a run

use crate::extract::Label;
use crate::mapreduce::FinalTally;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one chunk, without its counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    pub chunk_id: usize,
    pub records: u64,
    pub dropped: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub job_name: String,
    pub chunks: usize,
    pub records: u64,
    pub dropped: u64,
    /// Chunk attempts beyond the first
    pub retries: u64,
    pub tally: Vec<(Label, u64)>,
    pub files: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl PipelineSummary {
    pub(crate) fn new(job_name: &str, chunk_stats: &[ChunkStats], tally: &FinalTally) -> Self {
        Self {
            job_name: job_name.to_string(),
            chunks: chunk_stats.len(),
            records: chunk_stats.iter().map(|s| s.records).sum(),
            dropped: chunk_stats.iter().map(|s| s.dropped).sum(),
            retries: chunk_stats
                .iter()
                .map(|s| u64::from(s.attempts.saturating_sub(1)))
                .sum(),
            tally: tally.iter().map(|(l, n)| (l.clone(), n)).collect(),
            files: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Job '{}' completed in {:.2?}", self.job_name, self.elapsed)?;
        writeln!(f, "  Chunks processed:  {}", self.chunks)?;
        writeln!(f, "  Records labelled:  {}", self.records)?;
        writeln!(f, "  Records dropped:   {}", self.dropped)?;
        writeln!(f, "  Chunk retries:     {}", self.retries)?;
        for (label, count) in &self.tally {
            writeln!(f, "  {label}: {count}")?;
        }
        Ok(())
    }
}
