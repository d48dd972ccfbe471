//! Structured error types for the tally pipeline
//!
//! Per-record failures (`MalformedRecord`) are recoverable and absorbed by the
//! local aggregator. Every other variant is fatal for the run and propagates
//! to the orchestrator.

use crate::pipeline::state::PipelineState;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tally pipeline
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("Input location {path} is unavailable: {reason}")]
    SourceUnavailable {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Malformed record at {location}: {reason}")]
    MalformedRecord { location: String, reason: String },

    #[error("Output location {path} is unavailable: {reason}")]
    SinkUnavailable {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Count for label '{label}' overflowed")]
    CountOverflow { label: String },

    #[error("Aggregator for chunk {chunk_id} failed after {attempts} attempt(s): {reason}")]
    AggregatorFailure {
        chunk_id: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Shuffle merge failed: {reason}")]
    MergeFailure { reason: String },

    #[error("Invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidState {
        from: PipelineState,
        to: PipelineState,
    },
}

impl TallyError {
    /// Whether the error may be absorbed at the aggregator boundary
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TallyError::MalformedRecord { .. })
    }

    /// Whether re-running the same chunk from scratch could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TallyError::AggregatorFailure { .. })
    }

    pub(crate) fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        TallyError::MalformedRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        TallyError::Config {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;
