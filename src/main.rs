use anyhow::{Context, Result};
use clap::Parser;
use sentiment_tally::config::{ConfigLoader, ExtractorKind, MergeStrategy};
use sentiment_tally::pipeline::Orchestrator;
use std::path::PathBuf;
use tracing::{debug, error, trace};

/// Count sentiment polarity labels across a corpus of reviews
#[derive(Parser)]
#[command(name = "sentiment-tally", version)]
#[command(about = "Count sentiment polarity labels across a corpus of reviews", long_about = None)]
struct Cli {
    /// Input file or directory of newline-delimited review records
    input: PathBuf,

    /// Output directory (must not exist unless --overwrite is given)
    output: PathBuf,

    /// Path to a TOML configuration file (default: ./tally.toml if present)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Maximum number of chunks aggregated concurrently
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Maximum split size in bytes
    #[arg(long)]
    split_size: Option<u64>,

    /// Number of reduce partitions (one part file each)
    #[arg(short = 'r', long)]
    reducers: Option<usize>,

    /// Merge strategy for partial counts
    #[arg(long, value_enum)]
    merge: Option<MergeStrategy>,

    /// Label extraction rule
    #[arg(short = 'e', long, value_enum)]
    extractor: Option<ExtractorKind>,

    /// Attempts per chunk before a failure aborts the job
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Replace the output directory if it already exists
    #[arg(long)]
    overwrite: bool,

    /// Labels to report with a zero count when never observed (comma separated)
    #[arg(long, value_delimiter = ',')]
    report_zero: Vec<String>,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Print the job summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 2)
        .with_line_number(cli.verbose >= 2)
        .init();

    debug!("sentiment-tally started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let config = ConfigLoader::new()
        .load_file(cli.config.as_deref(), &cwd)
        .await
        .context("Failed to load configuration")?
        .with_env()
        .with_overrides(|config| {
            if let Some(parallelism) = cli.parallelism {
                config.parallelism = parallelism;
            }
            if let Some(split_size) = cli.split_size {
                config.split_size = split_size;
            }
            if let Some(reducers) = cli.reducers {
                config.reducers = reducers;
            }
            if let Some(merge) = cli.merge {
                config.merge = merge;
            }
            if let Some(extractor) = cli.extractor {
                config.extractor = extractor;
            }
            if let Some(max_attempts) = cli.max_attempts {
                config.max_attempts = max_attempts;
            }
            if cli.overwrite {
                config.overwrite = true;
            }
            if !cli.report_zero.is_empty() {
                config.report_zero = cli.report_zero.clone();
            }
            if cli.progress {
                config.progress = true;
            }
        })
        .finish()
        .context("Invalid configuration")?;

    debug!("Effective configuration: {:?}", config);

    let mut orchestrator = Orchestrator::for_paths(config, &cli.input, &cli.output);
    let summary = orchestrator.run().await.with_context(|| {
        format!(
            "Job failed for input {} and output {}",
            cli.input.display(),
            cli.output.display()
        )
    })?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{summary}");
    }
    Ok(())
}
