//! Table sinks: destinations that accept a table declaration followed by
//! row batches.

use super::TableSchema;
use crate::error::{CbmError, Result};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Destination for named tables.
///
/// `create_table` is called once per table, before its first `append`.
/// Batches passed to `append` always match the declared schema.
pub trait TableSink {
    fn create_table(
        &mut self,
        table: &str,
        schema: &TableSchema,
        indices: &[String],
    ) -> Result<()>;

    fn append(&mut self, table: &str, batch: &mut DataFrame) -> Result<()>;

    /// Flush and close every table
    fn finish(&mut self) -> Result<()>;
}

impl<S: TableSink + ?Sized> TableSink for Box<S> {
    fn create_table(
        &mut self,
        table: &str,
        schema: &TableSchema,
        indices: &[String],
    ) -> Result<()> {
        (**self).create_table(table, schema, indices)
    }

    fn append(&mut self, table: &str, batch: &mut DataFrame) -> Result<()> {
        (**self).append(table, batch)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    frame: DataFrame,
    indices: Vec<String>,
    appends: usize,
}

/// In-memory sink holding every table as one `DataFrame`
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, MemoryTable>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&DataFrame> {
        self.tables.get(name).map(|t| &t.frame)
    }

    pub fn indices(&self, name: &str) -> Option<&[String]> {
        self.tables.get(name).map(|t| t.indices.as_slice())
    }

    /// Number of batches appended to a table
    pub fn appends(&self, name: &str) -> usize {
        self.tables.get(name).map_or(0, |t| t.appends)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl TableSink for MemorySink {
    fn create_table(
        &mut self,
        table: &str,
        schema: &TableSchema,
        indices: &[String],
    ) -> Result<()> {
        if self.tables.contains_key(table) {
            return Err(CbmError::sink_write(table, "table already exists"));
        }
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                frame: DataFrame::empty_with_schema(&schema.to_polars()),
                indices: indices.to_vec(),
                appends: 0,
            },
        );
        debug!("Created in-memory table {} ({})", table, schema.describe());
        Ok(())
    }

    fn append(&mut self, table: &str, batch: &mut DataFrame) -> Result<()> {
        let target = self
            .tables
            .get_mut(table)
            .ok_or_else(|| CbmError::sink_write(table, "append before create_table"))?;
        target.frame.vstack_mut(batch)?;
        target.appends += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for table in self.tables.values_mut() {
            table.frame.as_single_chunk_par();
        }
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ("ID".to_string(), DataType::Int64),
            ("Area".to_string(), DataType::Float64),
        ])
    }

    fn batch(ids: &[i64]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("ID".into(), ids.to_vec()),
            Column::new("Area".into(), ids.iter().map(|i| *i as f64 * 1.5).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    #[test]
    fn test_memory_sink_accumulates_batches() {
        let mut sink = MemorySink::new();
        sink.create_table("T", &schema(), &["Area".to_string()]).unwrap();
        sink.append("T", &mut batch(&[1, 2])).unwrap();
        sink.append("T", &mut batch(&[3])).unwrap();
        sink.finish().unwrap();

        let frame = sink.table("T").unwrap();
        assert_eq!(frame.height(), 3);
        assert_eq!(sink.appends("T"), 2);
        assert_eq!(sink.indices("T").unwrap(), ["Area".to_string()]);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_memory_sink_rejects_unknown_and_duplicate_tables() {
        let mut sink = MemorySink::new();
        assert!(sink.append("missing", &mut batch(&[1])).is_err());

        sink.create_table("T", &schema(), &[]).unwrap();
        assert!(matches!(
            sink.create_table("T", &schema(), &[]),
            Err(CbmError::SinkWrite { .. })
        ));
    }
}
