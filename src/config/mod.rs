//! Job configuration
//!
//! Values are layered with increasing precedence:
//!
//! 1. Hardcoded defaults
//! 2. Optional TOML file (see [`loader::ConfigLoader`])
//! 3. `TALLY_*` environment variables
//! 4. Command line flags (applied by the binary)
//!
//! [`TallyConfig::validate`] runs once all layers are applied.

pub mod loader;

pub use loader::ConfigLoader;

use crate::error::{Result, TallyError};
use crate::extract::Label;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_JOB_NAME: &str = "Sentiment Polarity Count";

/// Default split size, 64 MiB
pub const DEFAULT_SPLIT_SIZE: u64 = 64 * 1024 * 1024;

/// How partial counts are combined into the final tally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Key-partitioned accumulators, each behind its own lock
    #[default]
    Partitioned,
    /// Queue partials and combine them pairwise at finalize
    Tree,
}

/// Built-in label extraction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Rating,
    Lexicon,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Name used in logs
    pub job_name: String,

    /// Maximum number of chunks aggregated concurrently
    pub parallelism: usize,

    /// Maximum size in bytes of one input split
    pub split_size: u64,

    /// Number of reduce partitions, one output file each
    pub reducers: usize,

    pub merge: MergeStrategy,

    /// Attempts per chunk before an aggregator failure is fatal
    pub max_attempts: u32,

    /// Replace an existing output location
    pub overwrite: bool,

    pub extractor: ExtractorKind,

    /// Ratings at or above this are positive
    pub positive_rating: f64,

    /// Ratings at or below this are negative
    pub negative_rating: f64,

    pub extra_positive: Vec<String>,
    pub extra_negative: Vec<String>,

    /// Labels written with a zero count when never observed
    pub report_zero: Vec<String>,

    /// Show a progress bar over chunks
    pub progress: bool,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            parallelism: default_parallelism(),
            split_size: DEFAULT_SPLIT_SIZE,
            reducers: 1,
            merge: MergeStrategy::default(),
            max_attempts: 4,
            overwrite: false,
            extractor: ExtractorKind::default(),
            positive_rating: 4.0,
            negative_rating: 2.0,
            extra_positive: Vec::new(),
            extra_negative: Vec::new(),
            report_zero: Vec::new(),
            progress: false,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TallyConfig {
    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `TALLY_*` overrides from an arbitrary lookup
    ///
    /// Unparsable values are ignored with a warning and the previous layer
    /// stays in effect.
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("TALLY_JOB_NAME") {
            self.job_name = name;
        }
        apply_parsed(&lookup, "TALLY_PARALLELISM", &mut self.parallelism);
        apply_parsed(&lookup, "TALLY_SPLIT_SIZE", &mut self.split_size);
        apply_parsed(&lookup, "TALLY_REDUCERS", &mut self.reducers);
        apply_parsed(&lookup, "TALLY_MAX_ATTEMPTS", &mut self.max_attempts);
        apply_parsed(&lookup, "TALLY_OVERWRITE", &mut self.overwrite);

        if let Some(value) = lookup("TALLY_MERGE") {
            match MergeStrategy::from_str(&value, true) {
                Ok(merge) => self.merge = merge,
                Err(_) => warn!("Ignoring invalid TALLY_MERGE value: {}", value),
            }
        }

        if let Some(value) = lookup("TALLY_EXTRACTOR") {
            match ExtractorKind::from_str(&value, true) {
                Ok(kind) => self.extractor = kind,
                Err(_) => warn!("Ignoring invalid TALLY_EXTRACTOR value: {}", value),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(TallyError::config("parallelism", "must be at least 1"));
        }
        if self.split_size == 0 {
            return Err(TallyError::config("split_size", "must be at least 1 byte"));
        }
        if self.reducers == 0 {
            return Err(TallyError::config("reducers", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(TallyError::config("max_attempts", "must be at least 1"));
        }
        if !self.positive_rating.is_finite() || !self.negative_rating.is_finite() {
            return Err(TallyError::config(
                "positive_rating",
                "rating thresholds must be finite",
            ));
        }
        if self.negative_rating >= self.positive_rating {
            return Err(TallyError::config(
                "negative_rating",
                format!(
                    "{} must be below positive_rating {}",
                    self.negative_rating, self.positive_rating
                ),
            ));
        }
        if let Some(bad) = self
            .report_zero
            .iter()
            .find(|l| !Label::new(l.as_str()).is_writable())
        {
            return Err(TallyError::config(
                "report_zero",
                format!("label {bad:?} cannot be written as a line"),
            ));
        }
        Ok(())
    }
}

fn apply_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(key) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Ignoring invalid {} value: {}", key, value),
        }
    }
}
