//! Configuration management and validation.
//!
//! Provides configuration structures for chunked loading, parsing
//! strictness, output format, run-log parsing and reconciliation
//! tolerances, plus system profiling used to size chunks automatically.

use crate::constants::{
    DEFAULT_BLOCK_START_MARKER, DEFAULT_CHUNK_SIZE, DEFAULT_GROUPED_SNAPSHOT_PATTERN,
    DEFAULT_LOG_FILE_NAME, DEFAULT_RELATIVE_TOLERANCE, DEFAULT_SINGLE_LINE_SNAPSHOT_PATTERN,
    MAX_AUTO_CHUNK_SIZE, MIN_AUTO_CHUNK_SIZE,
};
use crate::error::{CbmError, Result};
use crate::parser::ParseMode;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CbmError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
            other => Err(CbmError::configuration(format!(
                "Unknown compression algorithm '{}' (expected snappy, zstd, lz4 or none)",
                other
            ))),
        }
    }
}

/// On-disk format of the output tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkFormat {
    Parquet,
    Csv,
}

impl FromStr for SinkFormat {
    type Err = CbmError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "parquet" => Ok(SinkFormat::Parquet),
            "csv" => Ok(SinkFormat::Csv),
            other => Err(CbmError::configuration(format!(
                "Unknown output format '{}' (expected parquet or csv)",
                other
            ))),
        }
    }
}

/// Output writing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: SinkFormat,

    /// Compression algorithm selection (parquet only)
    pub compression_algorithm: CompressionAlgorithm,

    /// Enable column statistics for query pruning (parquet only)
    pub enable_statistics: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: SinkFormat::Parquet,
            compression_algorithm: CompressionAlgorithm::Snappy,
            enable_statistics: true,
        }
    }
}

/// Snapshot file naming conventions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Glob matched against file names of one-line-per-record files
    pub single_line_pattern: String,

    /// Glob matched against file names of six-line grouped files
    pub grouped_pattern: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            single_line_pattern: DEFAULT_SINGLE_LINE_SNAPSHOT_PATTERN.to_string(),
            grouped_pattern: DEFAULT_GROUPED_SNAPSHOT_PATTERN.to_string(),
        }
    }
}

/// Run log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportLogConfig {
    pub log_file_name: String,

    /// Literal that opens a reconciliation block
    pub block_start_marker: String,
}

impl Default for ReportLogConfig {
    fn default() -> Self {
        Self {
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            block_start_marker: DEFAULT_BLOCK_START_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Relative tolerance when comparing configured and realized target sums
    pub relative_tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

/// System profiling information for chunk sizing
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Number of CPU cores available
    pub cpu_cores: usize,
    /// Available memory in MB
    pub memory_mb: usize,
}

impl SystemProfile {
    /// Auto-detect system capabilities
    pub fn detect() -> Self {
        use sysinfo::System;

        let mut system = System::new();
        system.refresh_memory();

        Self {
            cpu_cores: num_cpus::get(),
            memory_mb: (system.available_memory() / 1024 / 1024) as usize,
        }
    }

    /// Rows per chunk so that one chunk of the widest table (~60 columns of
    /// 8 bytes) stays within 1/64 of available memory
    pub fn recommended_chunk_size(&self) -> usize {
        let bytes_per_row = 60 * 8;
        let budget_bytes = self.memory_mb * 1024 * 1024 / 64;
        (budget_bytes / bytes_per_row).clamp(MIN_AUTO_CHUNK_SIZE, MAX_AUTO_CHUNK_SIZE)
    }
}

/// Global configuration for CBM output processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CbmConfig {
    /// Rows per chunk handed to the sink (0 = derive from system memory)
    pub chunk_size: usize,

    /// Treatment of malformed indicator and snapshot lines
    pub parse_mode: ParseMode,

    /// Show per-file progress spinners
    pub show_progress: bool,

    pub output: OutputConfig,

    pub snapshot: SnapshotConfig,

    pub report_log: ReportLogConfig,

    pub reconciliation: ReconciliationConfig,
}

impl Default for CbmConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parse_mode: ParseMode::Strict,
            show_progress: true,
            output: OutputConfig::default(),
            snapshot: SnapshotConfig::default(),
            report_log: ReportLogConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

impl CbmConfig {
    /// Set rows per chunk (0 = auto)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Skip malformed lines instead of failing the file load
    pub fn with_lenient_parsing(mut self) -> Self {
        self.parse_mode = ParseMode::Lenient;
        self
    }

    pub fn with_output_format(mut self, format: SinkFormat) -> Self {
        self.output.format = format;
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.output.compression_algorithm = compression;
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn with_log_file_name(mut self, name: impl Into<String>) -> Self {
        self.report_log.log_file_name = name.into();
        self
    }

    pub fn with_relative_tolerance(mut self, tolerance: f64) -> Self {
        self.reconciliation.relative_tolerance = tolerance;
        self
    }

    /// Chunk size to use, resolving 0 against the detected system profile
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size > 0 {
            return self.chunk_size;
        }
        let profile = SystemProfile::detect();
        let size = profile.recommended_chunk_size();
        debug!(
            "Chunk size auto-detected: {} rows ({} cores, {}MB available)",
            size, profile.cpu_cores, profile.memory_mb
        );
        size
    }

    /// Validate settings that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        if self.report_log.block_start_marker.trim().is_empty() {
            return Err(CbmError::configuration("Block start marker must not be empty"));
        }
        if self.report_log.log_file_name.trim().is_empty() {
            return Err(CbmError::configuration("Log file name must not be empty"));
        }
        let tolerance = self.reconciliation.relative_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(CbmError::configuration(format!(
                "Relative tolerance must be a non-negative number, got {}",
                tolerance
            )));
        }
        for pattern in [&self.snapshot.single_line_pattern, &self.snapshot.grouped_pattern] {
            glob::Pattern::new(pattern)?;
        }
        Ok(())
    }
}
