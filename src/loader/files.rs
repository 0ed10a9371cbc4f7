//! File-backed sinks writing one file per table into an output directory.

use super::TableSchema;
use super::sink::TableSink;
use crate::config::{OutputConfig, SinkFormat};
use crate::error::{CbmError, Result};
use polars::io::parquet::write::BatchedWriter;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Open the file sink matching the configured output format
pub fn file_sink(output_dir: &Path, config: &OutputConfig) -> Result<Box<dyn TableSink>> {
    Ok(match config.format {
        SinkFormat::Parquet => Box::new(ParquetSink::new(output_dir, config)?),
        SinkFormat::Csv => Box::new(CsvSink::new(output_dir)?),
    })
}

fn prepare_dir(output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    Ok(output_dir.to_path_buf())
}

/// Parquet sink streaming each table through a polars batched writer
pub struct ParquetSink {
    output_dir: PathBuf,
    compression: ParquetCompression,
    statistics: StatisticsOptions,
    writers: BTreeMap<String, BatchedWriter<File>>,
    written: Vec<PathBuf>,
}

impl ParquetSink {
    pub fn new(output_dir: &Path, config: &OutputConfig) -> Result<Self> {
        Ok(Self {
            output_dir: prepare_dir(output_dir)?,
            compression: config.compression_algorithm.to_polars_compression(),
            statistics: if config.enable_statistics {
                StatisticsOptions::full()
            } else {
                StatisticsOptions::empty()
            },
            writers: BTreeMap::new(),
            written: Vec::new(),
        })
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{table}.parquet"))
    }

    /// Files closed by `finish`
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }
}

impl TableSink for ParquetSink {
    fn create_table(
        &mut self,
        table: &str,
        schema: &TableSchema,
        indices: &[String],
    ) -> Result<()> {
        let path = self.table_path(table);
        let file = File::create(&path)?;
        let writer = ParquetWriter::new(file)
            .with_compression(self.compression)
            .with_statistics(self.statistics)
            .batched(&schema.to_polars())
            .map_err(|e| CbmError::sink_write(table, e))?;
        self.writers.insert(table.to_string(), writer);

        // Parquet has no secondary indices; column statistics serve lookups
        debug!(
            "Created {} with lookup columns [{}]",
            path.display(),
            indices.join(", ")
        );
        Ok(())
    }

    fn append(&mut self, table: &str, batch: &mut DataFrame) -> Result<()> {
        let writer = self
            .writers
            .get_mut(table)
            .ok_or_else(|| CbmError::sink_write(table, "append before create_table"))?;
        writer
            .write_batch(batch)
            .map_err(|e| CbmError::sink_write(table, e))
    }

    fn finish(&mut self) -> Result<()> {
        let writers = std::mem::take(&mut self.writers);
        for (table, writer) in writers {
            let bytes = writer
                .finish()
                .map_err(|e| CbmError::sink_write(&table, e))?;
            let path = self.table_path(&table);
            info!("Wrote {} ({} bytes)", path.display(), bytes);
            self.written.push(path);
        }
        Ok(())
    }
}

struct CsvTable {
    writer: BufWriter<File>,
    schema: TableSchema,
    header_written: bool,
}

/// CSV sink writing one file per table with a single header row
pub struct CsvSink {
    output_dir: PathBuf,
    tables: BTreeMap<String, CsvTable>,
    written: Vec<PathBuf>,
}

impl CsvSink {
    pub fn new(output_dir: &Path) -> Result<Self> {
        Ok(Self {
            output_dir: prepare_dir(output_dir)?,
            tables: BTreeMap::new(),
            written: Vec::new(),
        })
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{table}.csv"))
    }

    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_rows(name: &str, table: &mut CsvTable, batch: &mut DataFrame) -> Result<()> {
        CsvWriter::new(&mut table.writer)
            .include_header(!table.header_written)
            .finish(batch)
            .map_err(|e| CbmError::sink_write(name, e))?;
        table.header_written = true;
        Ok(())
    }
}

impl TableSink for CsvSink {
    fn create_table(
        &mut self,
        table: &str,
        schema: &TableSchema,
        indices: &[String],
    ) -> Result<()> {
        let path = self.table_path(table);
        let file = File::create(&path)?;
        self.tables.insert(
            table.to_string(),
            CsvTable {
                writer: BufWriter::new(file),
                schema: schema.clone(),
                header_written: false,
            },
        );
        debug!(
            "Created {} with lookup columns [{}]",
            path.display(),
            indices.join(", ")
        );
        Ok(())
    }

    fn append(&mut self, table: &str, batch: &mut DataFrame) -> Result<()> {
        let target = self
            .tables
            .get_mut(table)
            .ok_or_else(|| CbmError::sink_write(table, "append before create_table"))?;
        Self::write_rows(table, target, batch)
    }

    fn finish(&mut self) -> Result<()> {
        let tables = std::mem::take(&mut self.tables);
        for (name, mut table) in tables {
            if !table.header_written {
                let mut empty = DataFrame::empty_with_schema(&table.schema.to_polars());
                Self::write_rows(&name, &mut table, &mut empty)?;
            }
            table
                .writer
                .flush()
                .map_err(|e| CbmError::sink_write(&name, e))?;
            let path = self.table_path(&name);
            info!("Wrote {}", path.display());
            self.written.push(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ("RowID".to_string(), DataType::Int64),
            ("Area".to_string(), DataType::Float64),
        ])
    }

    fn batch(ids: &[i64]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("RowID".into(), ids.to_vec()),
            Column::new("Area".into(), ids.iter().map(|i| *i as f64).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    #[test]
    fn test_parquet_sink_writes_readable_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = ParquetSink::new(dir.path(), &OutputConfig::default()).unwrap();

        sink.create_table("Rows", &schema(), &[]).unwrap();
        sink.append("Rows", &mut batch(&[1, 2])).unwrap();
        sink.append("Rows", &mut batch(&[3])).unwrap();
        sink.finish().unwrap();

        let path = dir.path().join("Rows.parquet");
        assert_eq!(sink.written_files(), [path.clone()]);

        let df = ParquetReader::new(File::open(&path).unwrap())
            .finish()
            .unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.get_column_names_str(), vec!["RowID", "Area"]);
    }

    #[test]
    fn test_csv_sink_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();

        sink.create_table("Rows", &schema(), &[]).unwrap();
        sink.append("Rows", &mut batch(&[1])).unwrap();
        sink.append("Rows", &mut batch(&[2])).unwrap();
        sink.finish().unwrap();

        let text = fs::read_to_string(dir.path().join("Rows.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["RowID,Area", "1,1.0", "2,2.0"]);
    }

    #[test]
    fn test_csv_sink_empty_table_has_header() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();

        sink.create_table("Empty", &schema(), &[]).unwrap();
        sink.finish().unwrap();

        let text = fs::read_to_string(dir.path().join("Empty.csv")).unwrap();
        assert_eq!(text.trim(), "RowID,Area");
    }

    #[test]
    fn test_file_sink_follows_format() {
        let dir = TempDir::new().unwrap();
        let config = OutputConfig {
            format: SinkFormat::Csv,
            ..OutputConfig::default()
        };
        let mut sink = file_sink(dir.path(), &config).unwrap();
        sink.create_table("Rows", &schema(), &[]).unwrap();
        sink.finish().unwrap();

        assert!(dir.path().join("Rows.csv").exists());
    }
}
