//! Record sources
//!
//! A source plans a list of disjoint chunks up front and reads each one lazily
//! when an aggregator asks for it. Together the chunks cover every record
//! exactly once.

pub mod file;
pub mod memory;

pub use file::FileSource;
pub use memory::MemorySource;

use crate::error::Result;
use crate::record::Record;
use std::fmt;
use std::path::PathBuf;

/// Records of one chunk, read on demand
///
/// Items are `Err` for malformed records (recoverable) and for read failures
/// (fatal for the chunk). The iterator ends after a read failure.
pub type RecordIter = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Where a chunk's records live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Split {
    /// Lines of `path` whose first byte lies in `start..end`
    File { path: PathBuf, start: u64, end: u64 },
    /// Index into an in-memory chunk list
    Memory { index: usize },
}

/// Independently processable unit of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    pub split: Split,
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.split {
            Split::File { path, start, end } => {
                write!(f, "#{} {}[{}..{}]", self.id, path.display(), start, end)
            }
            Split::Memory { index } => write!(f, "#{} memory[{}]", self.id, index),
        }
    }
}

pub trait RecordSource: Send + Sync {
    /// Enumerate the chunks to process; fails with `SourceUnavailable`
    fn plan(&self) -> Result<Vec<Chunk>>;

    /// Open one planned chunk for reading
    fn open(&self, chunk: &Chunk) -> Result<RecordIter>;
}
