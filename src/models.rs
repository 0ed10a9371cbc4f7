//! Core data structures and types for CBM output processing.
//!
//! Defines indicator kinds, parsed record shapes, disturbance event
//! definitions and processing statistics used throughout the library.

use crate::constants::{CLASSIFIER_PAD, CLASSIFIER_SLOTS, KYOTO_FLAG_COUNT, UNCLASSIFIED, tables};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Indicator output files written by the simulation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorKind {
    Age,
    Pool,
    Flux,
    Disturbance,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 4] = [
        IndicatorKind::Age,
        IndicatorKind::Pool,
        IndicatorKind::Flux,
        IndicatorKind::Disturbance,
    ];

    /// File name the engine writes this indicator to
    pub fn file_name(&self) -> &'static str {
        match self {
            IndicatorKind::Age => "ageind.out",
            IndicatorKind::Pool => "poolind.out",
            IndicatorKind::Flux => "fluxind.out",
            IndicatorKind::Disturbance => "distind.out",
        }
    }

    /// Detect indicator kind from a file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            IndicatorKind::Age => tables::AGE_INDICATORS,
            IndicatorKind::Pool => tables::POOL_INDICATORS,
            IndicatorKind::Flux => tables::FLUX_INDICATORS,
            IndicatorKind::Disturbance => tables::DIST_INDICATORS,
        }
    }

    /// Primary key column assigned by the loader
    pub fn primary_key(&self) -> &'static str {
        match self {
            IndicatorKind::Age => "AgeIndicatorID",
            IndicatorKind::Pool => "PoolIndicatorID",
            IndicatorKind::Flux => "FluxIndicatorID",
            IndicatorKind::Disturbance => "DistIndicatorID",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndicatorKind::Age => "age",
            IndicatorKind::Pool => "pool",
            IndicatorKind::Flux => "flux",
            IndicatorKind::Disturbance => "disturbance-area",
        };
        f.write_str(label)
    }
}

/// Fixed-arity classifier value tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassifierValues(pub [i32; CLASSIFIER_SLOTS]);

impl ClassifierValues {
    /// All slots unclassified
    pub fn unclassified() -> Self {
        Self([UNCLASSIFIED; CLASSIFIER_SLOTS])
    }

    /// Normalize a raw value: absent or non-positive becomes unclassified
    pub fn normalize_raw(raw: Option<i32>) -> i32 {
        match raw {
            Some(value) if value > 0 => value,
            _ => UNCLASSIFIED,
        }
    }

    /// Key used for interning, with every non-positive slot (including
    /// padding) folded to the unclassified sentinel
    pub fn interning_key(&self) -> [i32; CLASSIFIER_SLOTS] {
        self.0.map(|value| Self::normalize_raw(Some(value)))
    }

    /// Overwrite slots from `declared` onwards with the padding value
    pub fn pad_from(&mut self, declared: usize) {
        for slot in self.0.iter_mut().skip(declared) {
            *slot = CLASSIFIER_PAD;
        }
    }
}

/// Fields shared by indicator and snapshot records
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub timestep: i32,
    pub spatial_unit: i32,
    pub classifiers: ClassifierValues,
    pub kyoto_flags: [i32; KYOTO_FLAG_COUNT],
    /// Layout-specific integer codes, in layout order
    pub codes: Vec<i32>,
    /// Layout-specific numeric measures, in layout order
    pub measures: Vec<f64>,
}

/// One row from an age, pool, flux or disturbance-area indicator file
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub kind: IndicatorKind,
    pub fields: RecordFields,
}

/// One per-stand state record, independent of its physical encoding
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub fields: RecordFields,
}

/// Kind of target a disturbance event is scheduled against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKind {
    Area,
    MerchantableCarbon,
    Proportion,
}

impl TargetKind {
    /// Parse a target kind from a code or label ("A", "Area", "M",
    /// "Merchantable Biomass C", "P", "Proportion", ...)
    pub fn from_label(label: &str) -> Option<Self> {
        let lowered = label.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        if lowered.starts_with('p') {
            Some(TargetKind::Proportion)
        } else if lowered.starts_with('m') || lowered.contains("biomass") {
            Some(TargetKind::MerchantableCarbon)
        } else if lowered.starts_with('a') {
            Some(TargetKind::Area)
        } else {
            None
        }
    }

    /// Single-letter code used in definitions and merged output
    pub fn code(&self) -> &'static str {
        match self {
            TargetKind::Area => "A",
            TargetKind::MerchantableCarbon => "M",
            TargetKind::Proportion => "P",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TargetKind::Area => "area",
            TargetKind::MerchantableCarbon => "merchantable carbon",
            TargetKind::Proportion => "proportion",
        };
        f.write_str(label)
    }
}

/// One scheduled disturbance event, as configured in the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceEventDefinition {
    pub event_id: i64,
    pub group_scenario_id: i64,
    pub spatial_unit_group: i64,
    pub timestep: i64,
    pub disturbance_type: i64,
    pub disturbance_group: i64,
    pub sort_type: i64,
    pub efficiency: f64,
    pub target_kind: TargetKind,
    pub target: f64,
}

/// One row of the reference table of known classifier combinations
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceClassifierSet {
    pub id: i64,
    pub values: [Option<i32>; CLASSIFIER_SLOTS],
}

/// Outcome of the reconciliation stage for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReconciliationStatus {
    /// No event definitions were supplied
    #[default]
    NotRequested,
    /// Proportion-based definitions prevent reconciliation
    Skipped { proportion_definitions: usize },
    /// Merged rows were written, possibly with warnings
    Completed { rows: usize, warnings: usize },
}

/// Processing statistics
#[derive(Debug)]
pub struct ProcessingStats {
    pub started_at: DateTime<Local>,
    pub files_processed: usize,
    pub lines_skipped: usize,
    pub rows_per_table: BTreeMap<String, usize>,
    pub classifier_sets_seeded: usize,
    pub classifier_sets_assigned: usize,
    pub reference_rows_dropped: usize,
    pub reconciliation: ReconciliationStatus,
    pub output_path: PathBuf,
    pub processing_time_ms: u128,
}

impl ProcessingStats {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            started_at: Local::now(),
            files_processed: 0,
            lines_skipped: 0,
            rows_per_table: BTreeMap::new(),
            classifier_sets_seeded: 0,
            classifier_sets_assigned: 0,
            reference_rows_dropped: 0,
            reconciliation: ReconciliationStatus::NotRequested,
            output_path,
            processing_time_ms: 0,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.rows_per_table.values().sum()
    }

    pub fn rows_in(&self, table: &str) -> usize {
        self.rows_per_table.get(table).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_kind_from_path() {
        assert_eq!(
            IndicatorKind::from_path(Path::new("/run/output/POOLIND.OUT")),
            Some(IndicatorKind::Pool)
        );
        assert_eq!(
            IndicatorKind::from_path(Path::new("distind.out")),
            Some(IndicatorKind::Disturbance)
        );
        assert_eq!(IndicatorKind::from_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_interning_key_folds_padding_and_zero() {
        let mut values = ClassifierValues([3, 0, -1, 4, 5, 6, 7, 8, 9, 10]);
        values.pad_from(7);
        assert_eq!(values.0[7..], [CLASSIFIER_PAD; 3]);
        assert_eq!(values.interning_key(), [3, 1, 1, 4, 5, 6, 7, 1, 1, 1]);
    }

    #[test]
    fn test_target_kind_labels() {
        assert_eq!(TargetKind::from_label("A"), Some(TargetKind::Area));
        assert_eq!(TargetKind::from_label("Area"), Some(TargetKind::Area));
        assert_eq!(
            TargetKind::from_label("Merchantable Biomass C"),
            Some(TargetKind::MerchantableCarbon)
        );
        assert_eq!(TargetKind::from_label("p"), Some(TargetKind::Proportion));
        assert_eq!(TargetKind::from_label(""), None);
        assert_eq!(TargetKind::from_label("xyz"), None);
    }
}
