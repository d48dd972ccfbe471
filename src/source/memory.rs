//! In-memory input, one vector of raw lines per chunk

use super::{Chunk, RecordIter, RecordSource, Split};
use crate::error::{Result, TallyError};
use crate::record::parse_line;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    chunks: Arc<Vec<Vec<String>>>,
}

impl MemorySource {
    pub fn new(chunks: Vec<Vec<String>>) -> Self {
        Self {
            chunks: Arc::new(chunks),
        }
    }

    /// Convenience constructor from string slices
    pub fn from_lines(chunks: &[&[&str]]) -> Self {
        Self::new(
            chunks
                .iter()
                .map(|lines| lines.iter().map(|l| l.to_string()).collect())
                .collect(),
        )
    }
}

impl RecordSource for MemorySource {
    fn plan(&self) -> Result<Vec<Chunk>> {
        Ok((0..self.chunks.len())
            .map(|index| Chunk {
                id: index,
                split: Split::Memory { index },
            })
            .collect())
    }

    fn open(&self, chunk: &Chunk) -> Result<RecordIter> {
        let index = match &chunk.split {
            Split::Memory { index } if *index < self.chunks.len() => *index,
            _ => {
                return Err(TallyError::AggregatorFailure {
                    chunk_id: chunk.id,
                    attempts: 1,
                    reason: format!("chunk {chunk} is not part of this source"),
                })
            }
        };

        let chunks = Arc::clone(&self.chunks);
        let iter = (0..chunks[index].len()).filter_map(move |line_no| {
            let location = format!("memory[{index}]:{}", line_no + 1);
            parse_line(chunks[index][line_no].as_bytes(), &location).transpose()
        });
        Ok(Box::new(iter))
    }
}
