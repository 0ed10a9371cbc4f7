//! Run log parsing into the reconciliation log table.
//!
//! Reconciliation blocks carry a varying set of keys. Parsing runs in two
//! passes: the first collects the union of keys (canonical columns first,
//! then unknown keys in first-seen order), the second fills every block
//! against that schema so absent keys become nulls.

pub mod grammar;

pub use grammar::{LineGrammar, RawBlock};

use crate::constants::{CANONICAL_LOG_COLUMNS, COUNT_LIKE_LOG_COLUMNS, TEXT_LOG_COLUMNS};
use crate::error::Result;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Storage class of a log column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogColumnKind {
    /// Counts and codes, missing or unparseable values become 0
    Count,
    /// Measures, missing or unparseable values become null
    Float,
    Text,
}

impl LogColumnKind {
    fn for_key(key: &str) -> Self {
        if COUNT_LIKE_LOG_COLUMNS.contains(&key) {
            LogColumnKind::Count
        } else if TEXT_LOG_COLUMNS.contains(&key) {
            LogColumnKind::Text
        } else {
            LogColumnKind::Float
        }
    }

    fn coerce(self, raw: Option<&str>) -> LogValue {
        let raw = raw.map(str::trim).filter(|value| !value.is_empty());
        match self {
            LogColumnKind::Count => LogValue::Int(raw.and_then(parse_count).unwrap_or(0)),
            LogColumnKind::Float => {
                LogValue::Float(raw.and_then(|value| value.parse::<f64>().ok()))
            }
            LogColumnKind::Text => LogValue::Text(raw.map(str::to_string)),
        }
    }
}

/// Integers, accepting integral floats such as `12.0`
fn parse_count(value: &str) -> Option<i64> {
    if let Ok(count) = value.parse::<i64>() {
        return Some(count);
    }
    let float = value.parse::<f64>().ok()?;
    (float.is_finite() && float.fract() == 0.0).then_some(float as i64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogColumn {
    pub name: String,
    pub kind: LogColumnKind,
}

/// One typed cell of the log table
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Int(i64),
    Float(Option<f64>),
    Text(Option<String>),
}

impl LogValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LogValue::Int(value) => Some(*value),
            LogValue::Float(value) => (*value).filter(|v| v.fract() == 0.0).map(|v| v as i64),
            LogValue::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LogValue::Int(value) => Some(*value as f64),
            LogValue::Float(value) => *value,
            LogValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            LogValue::Text(value) => value.as_deref(),
            _ => None,
        }
    }
}

/// Borrowed view of one parsed block
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationLogEntry<'a> {
    log: &'a ReconciliationLog,
    row: usize,
}

impl<'a> ReconciliationLogEntry<'a> {
    /// Position of the block in the log
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn get(&self, column: &str) -> Option<&'a LogValue> {
        let index = self.log.column_index(column)?;
        self.log.rows[self.row].get(index)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(LogValue::as_i64)
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(LogValue::as_f64)
    }

    pub fn text(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(LogValue::as_text)
    }
}

/// The parsed reconciliation log: one row per closed block
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationLog {
    columns: Vec<LogColumn>,
    rows: Vec<Vec<LogValue>>,
    discarded_blocks: usize,
}

impl ReconciliationLog {
    /// Build the table from extracted blocks
    pub fn from_blocks(blocks: &[RawBlock]) -> Self {
        // Pass 1: schema union
        let mut names: Vec<String> = CANONICAL_LOG_COLUMNS.iter().map(|s| s.to_string()).collect();
        let mut positions: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        for block in blocks {
            for (key, _) in &block.pairs {
                if !positions.contains_key(key) {
                    positions.insert(key.clone(), names.len());
                    names.push(key.clone());
                }
            }
        }
        let columns: Vec<LogColumn> = names
            .into_iter()
            .map(|name| LogColumn {
                kind: LogColumnKind::for_key(&name),
                name,
            })
            .collect();

        // Pass 2: fill against the union, first occurrence of a repeated key wins
        let rows = blocks
            .iter()
            .map(|block| {
                let mut raw: Vec<Option<&str>> = vec![None; columns.len()];
                for (key, value) in &block.pairs {
                    if let Some(&i) = positions.get(key) {
                        raw[i].get_or_insert(value.as_str());
                    }
                }
                columns
                    .iter()
                    .zip(raw)
                    .map(|(column, value)| column.kind.coerce(value))
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows,
            discarded_blocks: 0,
        }
    }

    pub fn columns(&self) -> &[LogColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Blocks dropped because they were never closed
    pub fn discarded_blocks(&self) -> usize {
        self.discarded_blocks
    }

    pub fn entry(&self, row: usize) -> Option<ReconciliationLogEntry<'_>> {
        (row < self.rows.len()).then_some(ReconciliationLogEntry { log: self, row })
    }

    pub fn entries(&self) -> impl Iterator<Item = ReconciliationLogEntry<'_>> {
        (0..self.rows.len()).map(move |row| ReconciliationLogEntry { log: self, row })
    }

    /// Typed table: Count → i64, Float → nullable f64, Text → nullable string
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let name: PlSmallStr = column.name.as_str().into();
                let cells = self.rows.iter().map(|row| &row[i]);
                match column.kind {
                    LogColumnKind::Count => Column::new(
                        name,
                        cells.map(|v| v.as_i64().unwrap_or(0)).collect::<Vec<i64>>(),
                    ),
                    LogColumnKind::Float => Column::new(
                        name,
                        cells.map(LogValue::as_f64).collect::<Vec<Option<f64>>>(),
                    ),
                    LogColumnKind::Text => Column::new(
                        name,
                        cells
                            .map(|v| v.as_text().map(str::to_string))
                            .collect::<Vec<Option<String>>>(),
                    ),
                }
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

/// Parser for reconciliation blocks in the run log
#[derive(Debug, Clone)]
pub struct ReportLogParser {
    grammar: LineGrammar,
    marker: String,
}

impl ReportLogParser {
    pub fn new(block_start_marker: impl Into<String>) -> Result<Self> {
        Ok(Self {
            grammar: LineGrammar::new()?,
            marker: block_start_marker.into(),
        })
    }

    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<ReconciliationLog> {
        let (blocks, discarded) = grammar::extract_blocks(reader, &self.grammar, &self.marker)?;
        let mut log = ReconciliationLog::from_blocks(&blocks);
        log.discarded_blocks = discarded;
        debug!(
            "Parsed {} reconciliation rows with {} columns",
            log.len(),
            log.columns.len()
        );
        Ok(log)
    }

    pub fn parse_str(&self, text: &str) -> Result<ReconciliationLog> {
        self.parse_reader(text.as_bytes())
    }

    pub fn parse_file(&self, path: &Path) -> Result<ReconciliationLog> {
        let file = File::open(path)?;
        let log = self.parse_reader(BufReader::new(file))?;
        info!(
            "Read {} reconciliation blocks from {}",
            log.len(),
            path.display()
        );
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::log_keys;

    const MARKER: &str = "Disturbance Reconciliation";

    const TWO_BLOCKS: &str = "\
Simulation started
=== Disturbance Reconciliation ===
Timestep:            1
Disturbance Type:    3
Disturbance Group:   2
Sort Type:           1
Target Type:         Area
Target Area:         150.0
Eligible Area:       400.0
Area Prop'n:         0.375
Records Changed:     12
stand loop finished
=== Disturbance Reconciliation ===
Timestep:            2
Disturbance Type:    3
Target Type:         Merchantable C
Target Biomass C:    880.5
Harvest Note:        7.5
Records Changed:     4
";

    fn parse(text: &str) -> ReconciliationLog {
        ReportLogParser::new(MARKER).unwrap().parse_str(text).unwrap()
    }

    #[test]
    fn test_missing_key_is_null_with_shared_schema() {
        let log = parse(TWO_BLOCKS);
        assert_eq!(log.len(), 2);

        let first = log.entry(0).unwrap();
        let second = log.entry(1).unwrap();
        assert_eq!(first.float(log_keys::TARGET_AREA), Some(150.0));
        assert_eq!(second.get(log_keys::TARGET_AREA), Some(&LogValue::Float(None)));
        assert_eq!(second.float(log_keys::TARGET_BIOMASS_C), Some(880.5));

        let df = log.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column(log_keys::TARGET_AREA).unwrap().null_count(), 1);
    }

    #[test]
    fn test_canonical_columns_first_then_extras() {
        let log = parse(TWO_BLOCKS);
        let names = log.column_names();

        assert_eq!(&names[..CANONICAL_LOG_COLUMNS.len()], CANONICAL_LOG_COLUMNS);
        assert_eq!(names.last(), Some(&"Harvest Note"));
        assert_eq!(
            log.columns().last().map(|c| c.kind),
            Some(LogColumnKind::Float)
        );
    }

    #[test]
    fn test_column_coercion() {
        let log = parse(TWO_BLOCKS);
        let second = log.entry(1).unwrap();

        assert_eq!(second.get(log_keys::SORT_TYPE), Some(&LogValue::Int(0)));
        assert_eq!(second.text(log_keys::TARGET_TYPE), Some("Merchantable C"));
        assert_eq!(second.int(log_keys::RECORDS_CHANGED), Some(4));

        let df = log.to_dataframe().unwrap();
        assert_eq!(df.column(log_keys::TIMESTEP).unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column(log_keys::TARGET_TYPE).unwrap().dtype(), &DataType::String);
        assert_eq!(df.column(log_keys::ELIGIBLE_AREA).unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_unparseable_values() {
        let text = "\
Disturbance Reconciliation
Timestep: one
Target Area: lots
Records Changed: 2
";
        let log = parse(text);
        let entry = log.entry(0).unwrap();
        assert_eq!(entry.int(log_keys::TIMESTEP), Some(0));
        assert_eq!(entry.float(log_keys::TARGET_AREA), None);
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let first = parse(TWO_BLOCKS);
        let second = parse(TWO_BLOCKS);
        assert_eq!(first, second);
        assert!(
            first
                .to_dataframe()
                .unwrap()
                .equals_missing(&second.to_dataframe().unwrap())
        );
    }

    #[test]
    fn test_log_without_blocks_has_canonical_schema() {
        let log = parse("nothing to see\n");
        assert!(log.is_empty());
        let df = log.to_dataframe().unwrap();
        assert_eq!(df.width(), CANONICAL_LOG_COLUMNS.len());
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn test_discarded_blocks_are_counted() {
        let text = format!("{TWO_BLOCKS}Disturbance Reconciliation\nTimestep: 9\n");
        let log = parse(&text);
        assert_eq!(log.len(), 2);
        assert_eq!(log.discarded_blocks(), 1);
    }
}
