//! Command-line interface components.

use crate::config::{CbmConfig, CompressionAlgorithm, SinkFormat};
use crate::metadata::{read_classifier_reference, read_event_definitions};
use crate::models::{ProcessingStats, ReconciliationStatus};
use crate::processor::RunProcessor;
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "cbm_processor")]
#[command(about = "Load forest-carbon simulation output into normalized tables")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Directory holding the run's indicator files, snapshots and run log
    #[arg(value_name = "RUN_PATH")]
    pub run_path: PathBuf,

    /// Output directory for table files (defaults to RUN_PATH/tables)
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// CSV of known classifier sets (ClassifierSetID,c1..c10) used to seed ids
    #[arg(long, value_name = "CSV")]
    pub classifier_sets: Option<PathBuf>,

    /// CSV of disturbance event definitions to reconcile against the run log
    #[arg(long, value_name = "CSV")]
    pub events: Option<PathBuf>,

    /// Rows per chunk (0 = size from available memory)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Output format (parquet, csv)
    #[arg(long, default_value = "parquet")]
    pub format: String,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Skip lines with the wrong number of tokens instead of failing
    #[arg(long)]
    pub lenient: bool,

    /// Disable progress spinners
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Build the processing configuration from the arguments
    pub fn to_config(&self) -> Result<CbmConfig> {
        let mut config = CbmConfig::default()
            .with_output_format(self.format.parse::<SinkFormat>()?)
            .with_compression(self.compression.parse::<CompressionAlgorithm>()?);
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        if self.lenient {
            config = config.with_lenient_parsing();
        }
        if self.no_progress || self.quiet {
            config = config.without_progress();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Set up structured logging based on CLI arguments
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cbm_processor={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {}", log_level);
}

/// Run the whole pipeline for the parsed arguments
pub async fn run(args: Args) -> Result<ProcessingStats> {
    let config = args.to_config()?;
    let show_summary = !args.quiet;

    let mut processor = RunProcessor::new(args.run_path.clone(), args.output_path.clone())?
        .with_config(config);

    if let Some(path) = &args.classifier_sets {
        let rows = read_classifier_reference(path)
            .with_context(|| format!("Failed to read classifier sets from {}", path.display()))?;
        processor = processor.with_classifier_reference(rows);
    }
    if let Some(path) = &args.events {
        let definitions = read_event_definitions(path)
            .with_context(|| format!("Failed to read event definitions from {}", path.display()))?;
        processor = processor.with_event_definitions(definitions);
    }

    let stats = processor.process().await?;
    if show_summary {
        report_summary(&stats);
    }
    Ok(stats)
}

/// Print the colored end-of-run summary
pub fn report_summary(stats: &ProcessingStats) {
    let seconds = stats.processing_time_ms as f64 / 1000.0;

    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}",
        "Started:".bright_cyan(),
        stats.started_at.format("%Y-%m-%d %H:%M:%S").to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Time elapsed:".bright_cyan(),
        format!("{:.2}s", seconds).bright_white()
    );
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        stats.files_processed.to_string().bright_white()
    );
    if stats.lines_skipped > 0 {
        println!(
            "  {} {}",
            "Lines skipped:".bright_yellow(),
            stats.lines_skipped.to_string().bright_yellow().bold()
        );
    }
    println!(
        "  {} {}",
        "Total rows:".bright_cyan(),
        stats.total_rows().to_string().bright_white().bold()
    );
    for (table, rows) in &stats.rows_per_table {
        println!("    {:<30} {}", table, rows.to_string().bright_white());
    }
    println!(
        "  {} {} seeded, {} new",
        "Classifier sets:".bright_cyan(),
        stats.classifier_sets_seeded.to_string().bright_white(),
        stats.classifier_sets_assigned.to_string().bright_white()
    );
    if stats.reference_rows_dropped > 0 {
        println!(
            "  {} {}",
            "Reference rows dropped:".bright_yellow(),
            stats.reference_rows_dropped.to_string().bright_yellow()
        );
    }

    let reconciliation = match &stats.reconciliation {
        ReconciliationStatus::NotRequested => "not requested".bright_black(),
        ReconciliationStatus::Skipped {
            proportion_definitions,
        } => format!(
            "skipped ({} proportion-based definitions)",
            proportion_definitions
        )
        .bright_yellow(),
        ReconciliationStatus::Completed { rows, warnings: 0 } => {
            format!("{} events matched", rows).bright_white()
        }
        ReconciliationStatus::Completed { rows, warnings } => {
            format!("{} events matched, {} warnings", rows, warnings).bright_yellow()
        }
    };
    println!("  {} {}", "Reconciliation:".bright_cyan(), reconciliation);
    println!(
        "  {} {}",
        "Output:".bright_cyan(),
        stats.output_path.display().to_string().bright_white()
    );
}
