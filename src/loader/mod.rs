//! Chunked table loading.
//!
//! `ChunkedLoader` sits between the batch builders and a `TableSink`. It
//! splits oversized batches, prepends a contiguous primary key per table,
//! detects schema drift, and refuses further writes once the sink has
//! failed.

pub mod files;
pub mod sink;

pub use files::{CsvSink, ParquetSink, file_sink};
pub use sink::{MemorySink, TableSink};

use crate::error::{CbmError, Result};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Ordered column names and types of a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    fields: Vec<(String, DataType)>,
}

impl TableSchema {
    pub fn new(fields: Vec<(String, DataType)>) -> Self {
        Self { fields }
    }

    /// Schema of a batch, in column order
    pub fn of(df: &DataFrame) -> Self {
        Self {
            fields: df
                .get_columns()
                .iter()
                .map(|c| (c.name().to_string(), c.dtype().clone()))
                .collect(),
        }
    }

    fn with_leading_key(&self, key: &str) -> Self {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.push((key.to_string(), DataType::Int64));
        fields.extend(self.fields.iter().cloned());
        Self { fields }
    }

    pub fn fields(&self) -> &[(String, DataType)] {
        &self.fields
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_polars(&self) -> Schema {
        Schema::from_iter(
            self.fields
                .iter()
                .map(|(name, dtype)| Field::new(name.as_str().into(), dtype.clone())),
        )
    }

    /// `name:type` pairs for error messages
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(name, dtype)| format!("{name}:{dtype}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Table declaration: key column and lookup indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    /// Loader-assigned key column; `None` when the batch carries its own key
    pub primary_key: Option<String>,
    pub indices: Vec<String>,
}

impl TableSpec {
    /// Spec with the default `<Table>ID` key and no indices
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            primary_key: Some(format!("{name}ID")),
            name,
            indices: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn without_primary_key(mut self) -> Self {
        self.primary_key = None;
        self
    }

    pub fn with_indices(mut self, columns: &[&str]) -> Self {
        self.indices = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Result of one `write` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub rows: usize,
    pub chunks: usize,
    /// Key range assigned to the batch, when the loader owns the key
    pub keys: Option<(i64, i64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLoad {
    pub rows: usize,
    pub chunks: usize,
}

/// Rows and chunks written per table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub tables: BTreeMap<String, TableLoad>,
}

impl LoadSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.rows).sum()
    }

    pub fn rows_in(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows)
    }
}

struct TableState {
    spec: TableSpec,
    /// Schema of incoming batches, without the loader key
    input_schema: TableSchema,
    next_key: i64,
    load: TableLoad,
}

/// Streams batches into a sink in bounded chunks
pub struct ChunkedLoader<S: TableSink> {
    sink: S,
    chunk_size: usize,
    declared: HashMap<String, TableSpec>,
    tables: HashMap<String, TableState>,
    poisoned: Option<String>,
}

impl<S: TableSink> ChunkedLoader<S> {
    pub fn new(sink: S, chunk_size: usize) -> Self {
        Self {
            sink,
            chunk_size: chunk_size.max(1),
            declared: HashMap::new(),
            tables: HashMap::new(),
            poisoned: None,
        }
    }

    /// Declare key and indices for a table before its first write
    pub fn declare(&mut self, spec: TableSpec) -> Result<()> {
        if self.tables.contains_key(&spec.name) {
            return Err(CbmError::configuration(format!(
                "Table {} is already created and cannot be redeclared",
                spec.name
            )));
        }
        self.declared.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Persist a batch, splitting it into chunks of at most `chunk_size` rows
    pub fn write(&mut self, table: &str, batch: DataFrame) -> Result<WriteReceipt> {
        if let Some(reason) = &self.poisoned {
            return Err(CbmError::LoaderPoisoned {
                reason: reason.clone(),
            });
        }

        let schema = TableSchema::of(&batch);
        if !self.tables.contains_key(table) {
            self.create(table, schema)?;
        } else {
            self.check_drift(table, &schema)?;
        }

        let total = batch.height();
        let mut receipt = WriteReceipt {
            rows: 0,
            chunks: 0,
            keys: None,
        };
        let mut offset = 0;
        while offset < total {
            let len = self.chunk_size.min(total - offset);
            let chunk = batch.slice(offset as i64, len);
            let first_key = self.append_chunk(table, chunk)?;
            if let Some(first) = first_key {
                let last = first + len as i64 - 1;
                receipt.keys = Some(match receipt.keys {
                    Some((start, _)) => (start, last),
                    None => (first, last),
                });
            }
            receipt.rows += len;
            receipt.chunks += 1;
            offset += len;
        }

        debug!(
            "Loaded {} rows into {} in {} chunks",
            receipt.rows, table, receipt.chunks
        );
        Ok(receipt)
    }

    fn create(&mut self, table: &str, input_schema: TableSchema) -> Result<()> {
        let spec = self
            .declared
            .remove(table)
            .unwrap_or_else(|| TableSpec::new(table));

        let schema = match &spec.primary_key {
            Some(key) if input_schema.contains(key) => {
                return Err(CbmError::configuration(format!(
                    "Table {} batch already has a {} column",
                    table, key
                )));
            }
            Some(key) => input_schema.with_leading_key(key),
            None => input_schema.clone(),
        };

        let indices: Vec<String> = spec
            .indices
            .iter()
            .filter(|column| {
                let known = schema.contains(column);
                if !known {
                    warn!("Ignoring index on unknown column {} of {}", column, table);
                }
                known
            })
            .cloned()
            .collect();

        if let Err(e) = self.sink.create_table(table, &schema, &indices) {
            return Err(self.poison(table, e));
        }
        debug!("Created table {} ({})", table, schema.describe());

        self.tables.insert(
            table.to_string(),
            TableState {
                spec,
                input_schema,
                next_key: 1,
                load: TableLoad::default(),
            },
        );
        Ok(())
    }

    fn check_drift(&mut self, table: &str, schema: &TableSchema) -> Result<()> {
        let Some(state) = self.tables.get(table) else {
            return Ok(());
        };
        if &state.input_schema == schema {
            return Ok(());
        }
        let error = CbmError::SchemaDrift {
            table: table.to_string(),
            expected: state.input_schema.describe(),
            found: schema.describe(),
        };
        self.poisoned = Some(error.to_string());
        Err(error)
    }

    /// Append one chunk, returning the first key assigned to it
    fn append_chunk(&mut self, table: &str, mut chunk: DataFrame) -> Result<Option<i64>> {
        let Some(state) = self.tables.get_mut(table) else {
            return Err(CbmError::sink_write(table, "table was never created"));
        };
        let rows = chunk.height();
        let first_key = state.next_key;

        if let Some(key) = &state.spec.primary_key {
            let keys: Vec<i64> = (first_key..first_key + rows as i64).collect();
            chunk.insert_column(0, Column::new(key.as_str().into(), keys))?;
        }

        if let Err(e) = self.sink.append(table, &mut chunk) {
            return Err(self.poison(table, e));
        }

        let Some(state) = self.tables.get_mut(table) else {
            return Err(CbmError::sink_write(table, "table was never created"));
        };
        state.next_key += rows as i64;
        state.load.rows += rows;
        state.load.chunks += 1;
        Ok(state.spec.primary_key.as_ref().map(|_| first_key))
    }

    fn poison(&mut self, table: &str, error: CbmError) -> CbmError {
        let error = match error {
            CbmError::SinkWrite { .. } => error,
            other => CbmError::sink_write(table, other),
        };
        warn!("Loader stopped after sink failure: {}", error);
        self.poisoned = Some(error.to_string());
        error
    }

    /// Rows and chunks written so far
    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            tables: self
                .tables
                .iter()
                .map(|(name, state)| (name.clone(), state.load.clone()))
                .collect(),
        }
    }

    /// Flush the sink and hand it back with the load summary
    pub fn finish(mut self) -> Result<(S, LoadSummary)> {
        if let Some(reason) = self.poisoned.take() {
            return Err(CbmError::LoaderPoisoned { reason });
        }
        let summary = self.summary();
        self.sink
            .finish()
            .map_err(|e| match e {
                CbmError::SinkWrite { .. } => e,
                other => CbmError::sink_write("*", other),
            })?;
        Ok((self.sink, summary))
    }
}
