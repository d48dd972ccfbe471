//! Directory output in the `part-r-NNNNN` + `_SUCCESS` layout
//!
//! Everything is written to a staging directory next to the target and moved
//! into place with a single rename once every file is flushed, so readers
//! never observe a partial result.

use super::{partition_rows, render_rows, ResultSink, SinkReport};
use crate::error::{Result, TallyError};
use crate::extract::Label;
use crate::mapreduce::FinalTally;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SUCCESS_MARKER: &str = "_SUCCESS";

pub fn part_file_name(index: usize) -> String {
    format!("part-r-{index:05}")
}

#[derive(Debug, Clone)]
pub struct FileSink {
    output: PathBuf,
    reducers: usize,
    overwrite: bool,
    report_zero: Vec<Label>,
}

impl FileSink {
    pub fn new(output: impl Into<PathBuf>, reducers: usize) -> Self {
        Self {
            output: output.into(),
            reducers: reducers.max(1),
            overwrite: false,
            report_zero: Vec::new(),
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_report_zero(mut self, labels: Vec<Label>) -> Self {
        self.report_zero = labels;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn unavailable(&self, reason: &str, source: Option<std::io::Error>) -> TallyError {
        TallyError::SinkUnavailable {
            path: self.output.clone(),
            reason: reason.to_string(),
            source,
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl ResultSink for FileSink {
    fn check(&self) -> Result<()> {
        if self.output.exists() && !self.overwrite {
            return Err(self.unavailable("output location already exists", None));
        }
        Ok(())
    }

    fn write(&self, tally: &FinalTally) -> Result<SinkReport> {
        self.check()?;

        if let Some(label) = tally
            .iter()
            .map(|(label, _)| label)
            .chain(&self.report_zero)
            .find(|label| !label.is_writable())
        {
            return Err(self.unavailable(
                &format!("label {:?} cannot be written as a line", label.as_str()),
                None,
            ));
        }

        let parent = self.parent_dir();
        fs::create_dir_all(&parent)
            .map_err(|e| self.unavailable("cannot create parent directory", Some(e)))?;

        let staging = tempfile::Builder::new()
            .prefix(".tally-staging-")
            .tempdir_in(&parent)
            .map_err(|e| self.unavailable("cannot create staging directory", Some(e)))?;
        debug!("Staging output in {}", staging.path().display());

        let mut report = SinkReport::default();
        let rows = partition_rows(tally, self.reducers, &self.report_zero);
        for (index, partition) in rows.iter().enumerate() {
            let name = part_file_name(index);
            write_synced(&staging.path().join(&name), render_rows(partition).as_bytes())
                .map_err(|e| self.unavailable("cannot write part file", Some(e)))?;
            report.files.push(self.output.join(name));
            report.lines += partition.len();
        }
        write_synced(&staging.path().join(SUCCESS_MARKER), b"")
            .map_err(|e| self.unavailable("cannot write success marker", Some(e)))?;

        // The previous output is only deleted, with its holder, once the new
        // one is in place
        let replaced = if self.output.exists() {
            let holder = tempfile::Builder::new()
                .prefix(".tally-replaced-")
                .tempdir_in(&parent)
                .map_err(|e| self.unavailable("cannot create holding directory", Some(e)))?;
            let aside = holder.path().join("previous");
            fs::rename(&self.output, &aside)
                .map_err(|e| self.unavailable("cannot move existing output aside", Some(e)))?;
            Some((holder, aside))
        } else {
            None
        };

        // After a successful rename the guard's cleanup finds nothing to remove
        if let Err(e) = fs::rename(staging.path(), &self.output) {
            if let Some((_, aside)) = &replaced {
                if let Err(restore) = fs::rename(aside, &self.output) {
                    warn!(
                        "Could not restore previous output from {}: {}",
                        aside.display(),
                        restore
                    );
                }
            }
            return Err(self.unavailable("cannot move staged output into place", Some(e)));
        }
        drop(replaced);

        info!(
            "Wrote {} line(s) in {} file(s) to {}",
            report.lines,
            report.files.len(),
            self.output.display()
        );
        Ok(report)
    }
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
