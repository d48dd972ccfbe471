//! Filesystem input
//!
//! Files are cut into byte ranges of at most `split_size` bytes. A line is
//! owned by the split containing its first byte: a reader that starts inside a
//! file discards the partial line it lands in, and a reader always finishes the
//! last line it started even when that line runs past its end offset.

use super::{Chunk, RecordIter, RecordSource, Split};
use crate::error::{Result, TallyError};
use crate::record::{parse_line, Record};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A trailing split may exceed `split_size` by this factor instead of leaving
/// a tiny remainder
const SPLIT_SLOP: f64 = 1.1;

#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    split_size: u64,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>, split_size: u64) -> Self {
        Self {
            root: root.into(),
            split_size: split_size.max(1),
        }
    }

    /// List input files with their sizes, sorted by path
    ///
    /// Names starting with `_` or `.` are skipped, as are the contents of such
    /// directories. Symlinks are followed; a dangling link is an error.
    pub fn discover(&self) -> Result<Vec<(PathBuf, u64)>> {
        let unavailable = |reason: String, source: Option<std::io::Error>| {
            TallyError::SourceUnavailable {
                path: self.root.clone(),
                reason,
                source,
            }
        };

        let metadata = std::fs::metadata(&self.root)
            .map_err(|e| unavailable("cannot stat input".to_string(), Some(e)))?;

        if metadata.is_file() {
            return Ok(vec![(self.root.clone(), metadata.len())]);
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let reason = e.to_string();
                unavailable(reason, e.into_io_error())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let len = entry
                .metadata()
                .map_err(|e| {
                    let reason = e.to_string();
                    unavailable(reason, e.into_io_error())
                })?
                .len();
            files.push((entry.into_path(), len));
        }

        debug!("Discovered {} input file(s) under {}", files.len(), self.root.display());
        Ok(files)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('_') || name.starts_with('.'))
        .unwrap_or(false)
}

/// Pure: cut files into splits of at most `split_size` bytes
///
/// Empty files produce no splits. Chunk ids are assigned in order.
pub fn plan_splits(files: &[(PathBuf, u64)], split_size: u64) -> Vec<Chunk> {
    let split_size = split_size.max(1);
    let mut chunks = Vec::new();

    for (path, len) in files {
        let mut start = 0u64;
        while ((len - start) as f64) / (split_size as f64) > SPLIT_SLOP {
            chunks.push(Chunk {
                id: chunks.len(),
                split: Split::File {
                    path: path.clone(),
                    start,
                    end: start + split_size,
                },
            });
            start += split_size;
        }
        if start < *len {
            chunks.push(Chunk {
                id: chunks.len(),
                split: Split::File {
                    path: path.clone(),
                    start,
                    end: *len,
                },
            });
        }
    }

    chunks
}

impl RecordSource for FileSource {
    fn plan(&self) -> Result<Vec<Chunk>> {
        let files = self.discover()?;
        Ok(plan_splits(&files, self.split_size))
    }

    fn open(&self, chunk: &Chunk) -> Result<RecordIter> {
        match &chunk.split {
            Split::File { path, start, end } => {
                let lines = SplitLines::open(chunk.id, path, *start, *end)?;
                Ok(Box::new(lines))
            }
            Split::Memory { .. } => Err(TallyError::AggregatorFailure {
                chunk_id: chunk.id,
                attempts: 1,
                reason: "file source cannot open an in-memory chunk".to_string(),
            }),
        }
    }
}

/// Line reader bounded to one split
struct SplitLines {
    chunk_id: usize,
    path: PathBuf,
    reader: BufReader<File>,
    pos: u64,
    end: u64,
    buf: Vec<u8>,
    done: bool,
}

impl SplitLines {
    fn open(chunk_id: usize, path: &Path, start: u64, end: u64) -> Result<Self> {
        let read_failure = |e: std::io::Error| TallyError::AggregatorFailure {
            chunk_id,
            attempts: 1,
            reason: format!("cannot read {}: {e}", path.display()),
        };

        let file = File::open(path).map_err(read_failure)?;
        let mut reader = BufReader::new(file);
        let mut pos = 0;

        if start > 0 {
            // The byte before `start` tells whether a line begins exactly at it
            reader
                .seek(SeekFrom::Start(start - 1))
                .map_err(read_failure)?;
            let mut skipped = Vec::new();
            let n = reader
                .read_until(b'\n', &mut skipped)
                .map_err(read_failure)?;
            pos = start - 1 + n as u64;
        }

        Ok(Self {
            chunk_id,
            path: path.to_path_buf(),
            reader,
            pos,
            end,
            buf: Vec::new(),
            done: false,
        })
    }
}

impl Iterator for SplitLines {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.pos < self.end {
            let offset = self.pos;
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(n) => {
                    self.pos += n as u64;
                    let location = format!("{}@{}", self.path.display(), offset);
                    match parse_line(&self.buf, &location) {
                        Ok(Some(record)) => return Some(Ok(record)),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(TallyError::AggregatorFailure {
                        chunk_id: self.chunk_id,
                        attempts: 1,
                        reason: format!("read error in {}: {e}", self.path.display()),
                    }));
                }
            }
        }
        None
    }
}
