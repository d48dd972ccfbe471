//! Job orchestration
//!
//! The [`Orchestrator`] owns explicit handles to every stage and drives one
//! run through the [`state::PipelineState`] machine:
//!
//! 1. Check the sink and plan chunks (`Reading`)
//! 2. Aggregate chunks with bounded parallelism, handing each partial count
//!    to the shared merger as soon as its chunk completes (`Aggregating`)
//! 3. Finalize the merger once every chunk succeeded (`Merging`)
//! 4. Write the tally (`Writing`)
//!
//! The first unrecoverable chunk failure cancels queued chunks; the merger is
//! then dropped unfinalized and nothing is written.

pub mod state;
pub mod summary;

pub use state::{PipelineState, StateMachine};
pub use summary::{ChunkStats, PipelineSummary};

use crate::config::TallyConfig;
use crate::error::{Result, TallyError};
use crate::extract::{self, Label, LabelExtractor};
use crate::mapreduce::{LocalAggregator, ShuffleMerger};
use crate::sink::{FileSink, ResultSink};
use crate::source::{Chunk, FileSource, RecordSource};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    config: TallyConfig,
    source: Arc<dyn RecordSource>,
    extractor: Arc<dyn LabelExtractor>,
    sink: Arc<dyn ResultSink>,
    state: StateMachine,
}

impl Orchestrator {
    pub fn new(
        config: TallyConfig,
        source: Arc<dyn RecordSource>,
        extractor: Arc<dyn LabelExtractor>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            config,
            source,
            extractor,
            sink,
            state: StateMachine::default(),
        }
    }

    /// Wire the filesystem source and sink and the configured extractor
    pub fn for_paths(config: TallyConfig, input: &Path, output: &Path) -> Self {
        let source = Arc::new(FileSource::new(input, config.split_size));
        let extractor = extract::from_config(&config);
        let sink = Arc::new(
            FileSink::new(output, config.reducers)
                .with_overwrite(config.overwrite)
                .with_report_zero(config.report_zero.iter().map(|l| Label::new(l.as_str())).collect()),
        );
        Self::new(config, source, extractor, sink)
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn history(&self) -> &[PipelineState] {
        self.state.history()
    }

    /// Run the job once
    ///
    /// A second call fails with `InvalidState`.
    pub async fn run(&mut self) -> Result<PipelineSummary> {
        self.state.advance(PipelineState::Reading)?;
        info!("Starting job '{}'", self.config.job_name);

        let started = Instant::now();
        match self.execute().await {
            Ok(mut summary) => {
                summary.elapsed = started.elapsed();
                info!(
                    "Job '{}' finished: {} chunk(s), {} record(s), {} dropped, {} label(s)",
                    summary.job_name,
                    summary.chunks,
                    summary.records,
                    summary.dropped,
                    summary.tally.len()
                );
                Ok(summary)
            }
            Err(e) => {
                error!(
                    "Job '{}' failed during {}: {}",
                    self.config.job_name,
                    self.state.current(),
                    e
                );
                self.state.fail();
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<PipelineSummary> {
        self.sink.check()?;
        let chunks = self.source.plan()?;
        info!("Planned {} chunk(s)", chunks.len());

        self.state.advance(PipelineState::Aggregating)?;
        let merger = Arc::new(ShuffleMerger::new(self.config.merge, self.config.reducers));
        let chunk_stats = self.aggregate_all(chunks, Arc::clone(&merger)).await?;

        self.state.advance(PipelineState::Merging)?;
        let merger = Arc::try_unwrap(merger).map_err(|_| TallyError::MergeFailure {
            reason: "merger still referenced after all chunks completed".to_string(),
        })?;
        let tally = merger.finalize()?;

        let expected: u64 = chunk_stats.iter().map(|s| s.records).sum();
        let merged = tally.total()?;
        if merged != expected {
            return Err(TallyError::MergeFailure {
                reason: format!("tally holds {merged} record(s) but chunks labelled {expected}"),
            });
        }

        self.state.advance(PipelineState::Writing)?;
        let report = self.sink.write(&tally)?;

        self.state.advance(PipelineState::Done)?;
        let mut summary = PipelineSummary::new(&self.config.job_name, &chunk_stats, &tally);
        summary.files = report.files;
        Ok(summary)
    }

    async fn aggregate_all(
        &self,
        chunks: Vec<Chunk>,
        merger: Arc<ShuffleMerger>,
    ) -> Result<Vec<ChunkStats>> {
        let progress = create_progress_bar(chunks.len(), self.config.progress);
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let aggregator = LocalAggregator::new(Arc::clone(&self.extractor));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&self.source);
            let aggregator = aggregator.clone();
            let merger = Arc::clone(&merger);
            let cancelled = Arc::clone(&cancelled);
            let max_attempts = self.config.max_attempts;

            tasks.spawn(async move {
                let chunk_id = chunk.id;
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    TallyError::AggregatorFailure {
                        chunk_id,
                        attempts: 0,
                        reason: "scheduler closed".to_string(),
                    }
                })?;
                // A queued chunk may get its permit from the chunk that failed
                if cancelled.load(Ordering::SeqCst) {
                    return Err(TallyError::AggregatorFailure {
                        chunk_id,
                        attempts: 0,
                        reason: "cancelled after an earlier chunk failed".to_string(),
                    });
                }

                let outcome = async {
                    let (output, attempts) =
                        aggregate_with_retry(source, aggregator, chunk, max_attempts).await?;
                    merger.submit(output.counts)?;
                    Ok::<_, TallyError>(ChunkStats {
                        chunk_id: output.chunk_id,
                        records: output.records,
                        dropped: output.dropped,
                        attempts,
                    })
                }
                .await;

                if outcome.is_err() {
                    cancelled.store(true, Ordering::SeqCst);
                }
                outcome
            });
        }

        let mut stats = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(TallyError::AggregatorFailure {
                    chunk_id: usize::MAX,
                    attempts: 1,
                    reason: format!("scheduling task failed: {e}"),
                })
            });
            match outcome {
                Ok(chunk_stats) => {
                    progress.inc(1);
                    stats.push(chunk_stats);
                }
                Err(e) => {
                    progress.abandon_with_message("failed");
                    warn!("Cancelling {} outstanding chunk(s)", tasks.len());
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        progress.finish_with_message("aggregated");
        stats.sort_by_key(|s| s.chunk_id);
        Ok(stats)
    }
}

/// Run one chunk on the blocking pool, re-running it from scratch on
/// retryable failures
async fn aggregate_with_retry(
    source: Arc<dyn RecordSource>,
    aggregator: LocalAggregator,
    chunk: Chunk,
    max_attempts: u32,
) -> Result<(crate::mapreduce::ChunkOutput, u32)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let source = Arc::clone(&source);
        let aggregator = aggregator.clone();
        let task_chunk = chunk.clone();

        let result = tokio::task::spawn_blocking(move || {
            let records = source.open(&task_chunk)?;
            aggregator.aggregate(task_chunk.id, records)
        })
        .await
        .unwrap_or_else(|e| {
            Err(TallyError::AggregatorFailure {
                chunk_id: chunk.id,
                attempts: attempt,
                reason: format!("worker crashed: {e}"),
            })
        });

        match result {
            Ok(output) => {
                debug!("Chunk {} done after {} attempt(s)", chunk, attempt);
                return Ok((output, attempt));
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    "Chunk {} failed on attempt {}/{}: {}",
                    chunk, attempt, max_attempts, e
                );
            }
            Err(TallyError::AggregatorFailure { reason, .. }) => {
                return Err(TallyError::AggregatorFailure {
                    chunk_id: chunk.id,
                    attempts: attempt,
                    reason,
                })
            }
            Err(e) => return Err(e),
        }
    }
}

fn create_progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeStrategy;
    use crate::extract::FnExtractor;
    use crate::mapreduce::FinalTally;
    use crate::record::Record;
    use crate::sink::SinkReport;
    use crate::source::{MemorySource, RecordIter};
    use std::sync::atomic::{AtomicU32, AtomicUsize};
    use std::sync::Mutex;

    /// Captures the tally instead of writing files
    #[derive(Default)]
    struct CapturingSink {
        written: Mutex<Option<FinalTally>>,
    }

    impl ResultSink for CapturingSink {
        fn write(&self, tally: &FinalTally) -> Result<SinkReport> {
            *self.written.lock().unwrap() = Some(tally.clone());
            Ok(SinkReport::default())
        }
    }

    fn text_extractor() -> Arc<dyn LabelExtractor> {
        Arc::new(FnExtractor::new(|r: &Record| match r.text() {
            "great product" => Label::positive(),
            "terrible" => Label::negative(),
            "ok i guess" => Label::neutral(),
            other => Label::new(other),
        }))
    }

    fn orchestrator(
        source: Arc<dyn RecordSource>,
        sink: Arc<CapturingSink>,
        config: TallyConfig,
    ) -> Orchestrator {
        Orchestrator::new(config, source, text_extractor(), sink)
    }

    fn config() -> TallyConfig {
        TallyConfig {
            parallelism: 2,
            max_attempts: 3,
            ..TallyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_reference_corpus() {
        let sink = Arc::new(CapturingSink::default());
        let source = Arc::new(MemorySource::from_lines(&[&[
            "great product",
            "terrible",
            "ok i guess",
        ]]));
        let mut pipeline = orchestrator(source, Arc::clone(&sink), config());

        let summary = pipeline.run().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(summary.records, 3);

        let tally = sink.written.lock().unwrap().clone().unwrap();
        let lines: Vec<String> = tally.iter().map(|(l, n)| format!("{l}\t{n}")).collect();
        assert_eq!(lines, vec!["negative\t1", "neutral\t1", "positive\t1"]);
    }

    #[tokio::test]
    async fn test_two_chunks_both_strategies() {
        for merge in [MergeStrategy::Partitioned, MergeStrategy::Tree] {
            let sink = Arc::new(CapturingSink::default());
            let source = Arc::new(MemorySource::from_lines(&[
                &["A", "A", "B"],
                &["A", "B", "B"],
            ]));
            let mut pipeline = orchestrator(
                source,
                Arc::clone(&sink),
                TallyConfig {
                    merge,
                    reducers: 2,
                    ..config()
                },
            );
            pipeline.run().await.unwrap();

            let tally = sink.written.lock().unwrap().clone().unwrap();
            assert_eq!(tally.get(&Label::from("A")), Some(3));
            assert_eq!(tally.get(&Label::from("B")), Some(3));
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_is_not_an_error() {
        let sink = Arc::new(CapturingSink::default());
        let mut pipeline = orchestrator(
            Arc::new(MemorySource::default()),
            Arc::clone(&sink),
            config(),
        );
        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.chunks, 0);
        assert!(sink.written.lock().unwrap().clone().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_only_chunk_is_absorbed() {
        let sink = Arc::new(CapturingSink::default());
        let source = Arc::new(MemorySource::from_lines(&[&["{broken", "{also broken"], &["terrible"]]));
        let mut pipeline = orchestrator(source, Arc::clone(&sink), config());

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.records, 1);
        let tally = sink.written.lock().unwrap().clone().unwrap();
        assert_eq!(tally.len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let sink = Arc::new(CapturingSink::default());
        let mut pipeline = orchestrator(
            Arc::new(MemorySource::from_lines(&[&["terrible"]])),
            sink,
            config(),
        );
        pipeline.run().await.unwrap();
        assert!(matches!(
            pipeline.run().await,
            Err(TallyError::InvalidState { .. })
        ));
    }

    /// Fails the first `failures` opens of chunk 0, then delegates
    struct FlakySource {
        inner: MemorySource,
        failures: u32,
        opens: AtomicU32,
    }

    impl RecordSource for FlakySource {
        fn plan(&self) -> Result<Vec<Chunk>> {
            self.inner.plan()
        }

        fn open(&self, chunk: &Chunk) -> Result<RecordIter> {
            if chunk.id == 0 && self.opens.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(TallyError::AggregatorFailure {
                    chunk_id: chunk.id,
                    attempts: 1,
                    reason: "transient read error".to_string(),
                });
            }
            self.inner.open(chunk)
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_is_retried_from_scratch() {
        let sink = Arc::new(CapturingSink::default());
        let source = Arc::new(FlakySource {
            inner: MemorySource::from_lines(&[&["A", "B"], &["A"]]),
            failures: 2,
            opens: AtomicU32::new(0),
        });
        let mut pipeline = orchestrator(source, Arc::clone(&sink), config());

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.retries, 2);
        let tally = sink.written.lock().unwrap().clone().unwrap();
        assert_eq!(tally.get(&Label::from("A")), Some(2));
        assert_eq!(tally.get(&Label::from("B")), Some(1));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_without_writing() {
        let sink = Arc::new(CapturingSink::default());
        let source = Arc::new(FlakySource {
            inner: MemorySource::from_lines(&[&["A"], &["B"]]),
            failures: u32::MAX,
            opens: AtomicU32::new(0),
        });
        let mut pipeline = orchestrator(source, Arc::clone(&sink), config());

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(
            err,
            TallyError::AggregatorFailure {
                chunk_id: 0,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(
            pipeline.history(),
            &[
                PipelineState::Idle,
                PipelineState::Reading,
                PipelineState::Aggregating,
                PipelineState::Failed
            ]
        );
        assert!(sink.written.lock().unwrap().is_none());
    }

    /// Tracks open chunks and every chunk id opened
    #[derive(Default)]
    struct TrackingSource {
        inner: MemorySource,
        fail_chunk: Option<usize>,
        active: Arc<AtomicUsize>,
        peak: AtomicUsize,
        opened: Mutex<Vec<usize>>,
    }

    struct ActiveGuard(Arc<AtomicUsize>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Counts as active until the aggregator drops it
    struct GuardedIter {
        inner: RecordIter,
        _guard: ActiveGuard,
    }

    impl Iterator for GuardedIter {
        type Item = Result<Record>;

        fn next(&mut self) -> Option<Self::Item> {
            self.inner.next()
        }
    }

    impl RecordSource for TrackingSource {
        fn plan(&self) -> Result<Vec<Chunk>> {
            self.inner.plan()
        }

        fn open(&self, chunk: &Chunk) -> Result<RecordIter> {
            self.opened.lock().unwrap().push(chunk.id);
            if self.fail_chunk == Some(chunk.id) {
                return Err(TallyError::CountOverflow {
                    label: "positive".to_string(),
                });
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let guard = ActiveGuard(Arc::clone(&self.active));
            std::thread::sleep(std::time::Duration::from_millis(20));

            Ok(Box::new(GuardedIter {
                inner: self.inner.open(chunk)?,
                _guard: guard,
            }))
        }
    }

    fn one_line_chunks(count: usize) -> MemorySource {
        MemorySource::new((0..count).map(|i| vec![format!("chunk {i}")]).collect())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_active_aggregators_never_exceed_parallelism() {
        let source = Arc::new(TrackingSource {
            inner: one_line_chunks(12),
            ..TrackingSource::default()
        });
        let sink = Arc::new(CapturingSink::default());
        let mut pipeline = orchestrator(
            Arc::clone(&source) as Arc<dyn RecordSource>,
            Arc::clone(&sink),
            TallyConfig {
                parallelism: 3,
                ..config()
            },
        );

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.chunks, 12);
        assert_eq!(summary.records, 12);

        let peak = source.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak of {peak} active aggregators");
        assert_eq!(source.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fatal_failure_cancels_queued_chunks() {
        let source = Arc::new(TrackingSource {
            inner: one_line_chunks(5),
            fail_chunk: Some(0),
            ..TrackingSource::default()
        });
        let sink = Arc::new(CapturingSink::default());
        let mut pipeline = orchestrator(
            Arc::clone(&source) as Arc<dyn RecordSource>,
            Arc::clone(&sink),
            TallyConfig {
                parallelism: 1,
                ..config()
            },
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, TallyError::CountOverflow { .. }));
        assert_eq!(*source.opened.lock().unwrap(), vec![0]);
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(sink.written.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_panicking_extractor_is_an_aggregator_failure() {
        let sink = Arc::new(CapturingSink::default());
        let extractor: Arc<dyn LabelExtractor> = Arc::new(FnExtractor::new(|r: &Record| {
            if r.text() == "boom" {
                panic!("extractor bug");
            }
            Label::neutral()
        }));
        let mut pipeline = Orchestrator::new(
            TallyConfig {
                max_attempts: 1,
                ..config()
            },
            Arc::new(MemorySource::from_lines(&[&["fine"], &["boom"]])),
            extractor,
            Arc::clone(&sink) as Arc<dyn ResultSink>,
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, TallyError::AggregatorFailure { chunk_id: 1, .. }));
        assert!(sink.written.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_in_reading() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut pipeline = Orchestrator::for_paths(
            config(),
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("out"),
        );
        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, TallyError::SourceUnavailable { .. }));
        assert_eq!(
            pipeline.history(),
            &[PipelineState::Idle, PipelineState::Reading, PipelineState::Failed]
        );
        assert!(!temp_dir.path().join("out").exists());
    }
}
