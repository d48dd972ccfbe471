//! Count-by-key map/reduce core
//!
//! Chunks are folded into [`PartialCount`]s by [`LocalAggregator`]s running in
//! parallel, then shuffled by label into a [`ShuffleMerger`] that produces the
//! [`FinalTally`].

pub mod aggregator;
pub mod counts;
pub mod shuffle;


pub use aggregator::{ChunkOutput, LocalAggregator};
pub use counts::{FinalTally, PartialCount};
pub use shuffle::{partition_for, ShuffleMerger};
