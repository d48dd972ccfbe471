//! # sentiment-tally
//!
//! Counts sentiment polarity labels across a corpus of review records with a
//! partition → local reduce → shuffle-merge pipeline.
//!
//! ## Usage
//!
//! ```bash
//! sentiment-tally <INPUT> <OUTPUT> [-j parallelism] [--reducers n] [--extractor hybrid]
//! ```
//!
//! ## Modules
//!
//! - `config` - Layered job configuration (defaults, TOML file, environment, flags)
//! - `error` - Error taxonomy shared by every stage
//! - `extract` - Labels and pluggable label extractors
//! - `mapreduce` - Partial counts, local aggregation and the shuffle merger
//! - `pipeline` - Orchestrator and lifecycle state machine
//! - `record` - Review records and their line formats
//! - `sink` - Deterministic result output
//! - `source` - Chunked record input
pub mod config;
pub mod error;
pub mod extract;
pub mod mapreduce;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod source;

pub use error::{Result, TallyError};
