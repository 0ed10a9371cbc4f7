//! Error handling for CBM output processing.
//!
//! Provides error types with enough context (file, line, table) to locate
//! parse failures, schema drift and sink failures precisely.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CbmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Directory traversal failed: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Run output directory not found: {path}")]
    RunNotFound { path: PathBuf },

    #[error("Malformed line {line} in {path}: expected {expected} tokens, found {found}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value '{value}' for column {column} at line {line} in {path}")]
    InvalidValue {
        path: PathBuf,
        line: usize,
        column: String,
        value: String,
    },

    #[error("Invalid UTF-8 at line {line}, byte {offset} in {path}")]
    InvalidEncoding {
        path: PathBuf,
        line: usize,
        offset: usize,
    },

    #[error("Truncated record at line {line} in {path}: {reason}")]
    TruncatedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Unrecognised snapshot file name: {path}")]
    UnknownSnapshotEncoding { path: PathBuf },

    #[error("Schema drift in table {table}: expected [{expected}], found [{found}]")]
    SchemaDrift {
        table: String,
        expected: String,
        found: String,
    },

    #[error("Sink write failed for table {table}: {reason}")]
    SinkWrite { table: String, reason: String },

    #[error("Loader is unusable after an earlier failure: {reason}")]
    LoaderPoisoned { reason: String },

    #[error("Metadata error in {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl CbmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a sink write error for a table
    pub fn sink_write(table: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SinkWrite {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error invalidates the whole run rather than one input
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Self::SchemaDrift { .. }
                | Self::SinkWrite { .. }
                | Self::LoaderPoisoned { .. }
                | Self::Interrupted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CbmError>;
