//! Run processing engine.
//!
//! Orchestrates one ingestion run: discovery of the run's output files,
//! parsing with inline classifier interning, chunked loading into a table
//! sink, run log parsing and disturbance reconciliation.

pub mod batch;
pub mod discovery;

#[cfg(test)]
pub mod tests;

use self::{batch::BatchBuilder, discovery::RunDiscovery};

use crate::config::CbmConfig;
use crate::constants::{CLASSIFIER_SET_ID_COLUMN, tables};
use crate::error::{CbmError, Result};
use crate::interner::ClassifierSetInterner;
use crate::layout::RecordLayout;
use crate::loader::{ChunkedLoader, TableSink, TableSpec, file_sink};
use crate::models::{
    DisturbanceEventDefinition, IndicatorKind, IndicatorRecord, ProcessingStats, RecordFields,
    ReconciliationStatus, ReferenceClassifierSet, SnapshotRecord,
};
use crate::parser::{IndicatorReader, SnapshotReader};
use crate::reconcile::{DisturbanceReconciler, ReconciliationOutcome};
use crate::report_log::{ReconciliationLog, ReportLogParser};

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{debug, info, warn};

/// Rows between spinner refreshes
const PROGRESS_INTERVAL: usize = 10_000;

/// Main processor for one simulation run
#[derive(Debug, Clone)]
pub struct RunProcessor {
    run_path: PathBuf,
    output_path: PathBuf,
    config: CbmConfig,
    classifier_reference: Vec<ReferenceClassifierSet>,
    event_definitions: Option<Vec<DisturbanceEventDefinition>>,
}

impl RunProcessor {
    /// Create a processor for a run directory. Output defaults to a
    /// `tables` directory inside the run.
    pub fn new(run_path: PathBuf, output_path: Option<PathBuf>) -> Result<Self> {
        if !run_path.is_dir() {
            return Err(CbmError::RunNotFound { path: run_path });
        }
        let output_path = output_path.unwrap_or_else(|| run_path.join("tables"));

        Ok(Self {
            run_path,
            output_path,
            config: CbmConfig::default(),
            classifier_reference: Vec::new(),
            event_definitions: None,
        })
    }

    pub fn with_config(mut self, config: CbmConfig) -> Self {
        self.config = config;
        self
    }

    /// Known classifier combinations used to pre-seed the interner
    pub fn with_classifier_reference(mut self, rows: Vec<ReferenceClassifierSet>) -> Self {
        self.classifier_reference = rows;
        self
    }

    /// Event definitions to reconcile against the run log
    pub fn with_event_definitions(mut self, definitions: Vec<DisturbanceEventDefinition>) -> Self {
        self.event_definitions = Some(definitions);
        self
    }

    pub fn run_path(&self) -> &Path {
        &self.run_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn config(&self) -> &CbmConfig {
        &self.config
    }

    /// Main processing entry point: writes every table to files in the
    /// configured format on a blocking task
    pub async fn process(self) -> Result<ProcessingStats> {
        if self.config.show_progress {
            println!("{}", "Starting CBM run processing".bright_green().bold());
            println!("  {} {}", "Run:".bright_cyan(), self.run_path.display());
            println!("  {} {}", "Output:".bright_cyan(), self.output_path.display());
        }

        task::spawn_blocking(move || {
            let sink = file_sink(&self.output_path, &self.config.output)?;
            self.run_with_sink(sink).map(|(_, stats)| stats)
        })
        .await
        .map_err(|e| CbmError::Interrupted {
            reason: format!("processing task failed: {}", e),
        })?
    }

    /// Run the whole pipeline synchronously into `sink`, returning the
    /// finished sink with the run statistics
    pub fn run_with_sink<S: TableSink>(&self, sink: S) -> Result<(S, ProcessingStats)> {
        let start_time = Instant::now();
        self.config.validate()?;
        let mut stats = ProcessingStats::new(self.output_path.clone());

        let files = RunDiscovery::new(self.run_path.clone(), &self.config).discover()?;
        info!(
            "Discovered {} run files in {}",
            files.file_count(),
            self.run_path.display()
        );
        if files.is_empty() {
            warn!("No recognised output files in {}", self.run_path.display());
        }

        let mut interner = ClassifierSetInterner::new();
        if !self.classifier_reference.is_empty() {
            let report = interner.seed(self.classifier_reference.iter().cloned());
            stats.classifier_sets_seeded = report.accepted;
            stats.reference_rows_dropped = report.dropped();
        }

        let chunk_size = self.config.effective_chunk_size();
        let mut loader = ChunkedLoader::new(sink, chunk_size);
        declare_tables(&mut loader)?;

        for (kind, path) in &files.indicators {
            let reader = IndicatorReader::open(path, *kind, self.config.parse_mode)?;
            let skipped = self.load_records(
                &mut loader,
                &mut interner,
                kind.table_name(),
                path,
                RecordLayout::indicator(*kind),
                reader,
                |record: IndicatorRecord| record.fields,
                IndicatorReader::skipped_lines,
            )?;
            stats.lines_skipped += skipped;
            stats.files_processed += 1;
        }

        for (path, encoding) in &files.snapshots {
            debug!("Reading {:?} snapshot file {}", encoding, path.display());
            let reader = SnapshotReader::from_reader(
                BufReader::new(File::open(path)?),
                path,
                *encoding,
                self.config.parse_mode,
            );
            let skipped = self.load_records(
                &mut loader,
                &mut interner,
                tables::STAND_SNAPSHOTS,
                path,
                RecordLayout::snapshot(),
                reader,
                |record: SnapshotRecord| record.fields,
                SnapshotReader::skipped_lines,
            )?;
            stats.lines_skipped += skipped;
            stats.files_processed += 1;
        }

        let log = match &files.report_log {
            Some(path) => {
                let marker = self.config.report_log.block_start_marker.clone();
                let parser = ReportLogParser::new(marker)?;
                let log = parser.parse_file(path)?;
                loader.write(tables::RECONCILIATION_LOG, log.to_dataframe()?)?;
                stats.files_processed += 1;
                log
            }
            None => {
                warn!(
                    "Run log {} not found, reconciliation log is empty",
                    self.config.report_log.log_file_name
                );
                ReconciliationLog::from_blocks(&[])
            }
        };

        stats.reconciliation = self.reconcile(&mut loader, &log)?;

        loader.write(tables::CLASSIFIER_SETS, interner.to_dataframe()?)?;
        stats.classifier_sets_assigned = interner.assigned_this_session();

        let (sink, summary) = loader.finish()?;
        stats.rows_per_table = summary
            .tables
            .iter()
            .map(|(table, load)| (table.clone(), load.rows))
            .collect();
        stats.processing_time_ms = start_time.elapsed().as_millis();

        info!(
            "Loaded {} rows into {} tables in {}ms",
            stats.total_rows(),
            stats.rows_per_table.len(),
            stats.processing_time_ms
        );
        Ok((sink, stats))
    }

    fn reconcile<S: TableSink>(
        &self,
        loader: &mut ChunkedLoader<S>,
        log: &ReconciliationLog,
    ) -> Result<ReconciliationStatus> {
        let Some(definitions) = &self.event_definitions else {
            return Ok(ReconciliationStatus::NotRequested);
        };

        let reconciler = DisturbanceReconciler::new(self.config.reconciliation.relative_tolerance);
        match reconciler.reconcile(definitions, log) {
            ReconciliationOutcome::Skipped {
                proportion_definitions,
            } => Ok(ReconciliationStatus::Skipped {
                proportion_definitions,
            }),
            ReconciliationOutcome::Reconciled(report) => {
                loader.write(tables::RECONCILIATION, report.to_dataframe()?)?;
                Ok(ReconciliationStatus::Completed {
                    rows: report.rows.len(),
                    warnings: report.warnings.len(),
                })
            }
        }
    }

    /// Stream one file's records into `table`, returning the lines skipped
    /// in lenient mode
    #[allow(clippy::too_many_arguments)]
    fn load_records<S, I, T>(
        &self,
        loader: &mut ChunkedLoader<S>,
        interner: &mut ClassifierSetInterner,
        table: &str,
        path: &Path,
        layout: RecordLayout,
        mut records: I,
        fields_of: impl Fn(T) -> RecordFields,
        skipped_of: impl Fn(&I) -> usize,
    ) -> Result<usize>
    where
        S: TableSink,
        I: Iterator<Item = Result<T>>,
    {
        let spinner = file_spinner(self.config.show_progress, path);
        let chunk_size = loader.chunk_size();
        let mut builder = BatchBuilder::new(layout);
        let mut rows = 0;

        for record in records.by_ref() {
            let fields = fields_of(record?);
            let set_id = interner.get_or_assign(&fields.classifiers);
            builder.push(&fields, set_id);
            rows += 1;

            if builder.len() >= chunk_size {
                loader.write(table, builder.take()?)?;
            }
            if rows % PROGRESS_INTERVAL == 0 {
                spinner.set_message(format!("{} rows", rows));
            }
        }
        loader.write(table, builder.take()?)?;

        let skipped = skipped_of(&records);
        spinner.finish_and_clear();
        info!(
            "Loaded {} rows from {} into {}{}",
            rows,
            path.display(),
            table,
            if skipped > 0 {
                format!(" ({} malformed lines skipped)", skipped)
            } else {
                String::new()
            }
        );
        Ok(skipped)
    }
}

fn declare_tables<S: TableSink>(loader: &mut ChunkedLoader<S>) -> Result<()> {
    let record_indices = ["TimeStep", "SPUID", CLASSIFIER_SET_ID_COLUMN];
    for kind in IndicatorKind::ALL {
        loader.declare(
            TableSpec::new(kind.table_name())
                .with_primary_key(kind.primary_key())
                .with_indices(&record_indices),
        )?;
    }
    loader.declare(
        TableSpec::new(tables::STAND_SNAPSHOTS)
            .with_primary_key("StandSnapshotID")
            .with_indices(&["TimeStep", "RecordID", CLASSIFIER_SET_ID_COLUMN]),
    )?;
    loader.declare(TableSpec::new(tables::RECONCILIATION_LOG).with_indices(&["Timestep"]))?;
    loader.declare(TableSpec::new(tables::RECONCILIATION).with_indices(&["EventID", "TimeStep"]))?;
    loader.declare(
        TableSpec::new(tables::CLASSIFIER_SETS)
            .without_primary_key()
            .with_indices(&[CLASSIFIER_SET_ID_COLUMN]),
    )?;
    Ok(())
}

fn file_spinner(show: bool, path: &Path) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    spinner.set_prefix(
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
