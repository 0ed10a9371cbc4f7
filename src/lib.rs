//! CBM Processor Library
//!
//! A Rust library for ingesting the text output of a forest-carbon
//! simulation run into normalized tables, and for reconciling the
//! disturbance events configured for the run against what the engine
//! actually realized.
//!
//! This library provides tools for:
//! - Parsing age, pool, flux and disturbance-area indicator files
//! - Reading per-stand snapshot files in single-line and grouped encodings
//! - Interning classifier tuples into a shared `ClassifierSets` table
//! - Extracting disturbance reconciliation blocks from the run log
//! - Matching configured disturbance events to realized log entries
//! - Loading every table in bounded chunks into Parquet, CSV or memory

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod interner;
pub mod layout;
pub mod loader;
pub mod metadata;
pub mod models;
pub mod parser;
pub mod processor;
pub mod reconcile;
pub mod report_log;

// Re-export commonly used types
pub use config::{CbmConfig, CompressionAlgorithm, SinkFormat};
pub use error::{CbmError, Result};
pub use interner::ClassifierSetInterner;
pub use loader::{ChunkedLoader, MemorySink, TableSink};
pub use models::{
    DisturbanceEventDefinition, IndicatorKind, ProcessingStats, ReconciliationStatus, TargetKind,
};
pub use processor::RunProcessor;
pub use reconcile::{DisturbanceReconciler, ReconciliationOutcome};
pub use report_log::{ReconciliationLog, ReportLogParser};
