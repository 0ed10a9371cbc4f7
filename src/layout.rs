//! Column layouts for the fixed-format simulation output files.
//!
//! Every indicator file starts with the same prefix (timestep, spatial unit,
//! ten classifier slots, five kyoto flags) followed by kind-specific codes
//! and measures. Snapshot records use one canonical 66-column layout for
//! both physical encodings.

use crate::constants::{CLASSIFIER_SLOTS, KYOTO_FLAG_COUNT, MISSING_TOKENS};
use crate::error::{CbmError, Result};
use crate::models::{ClassifierValues, IndicatorKind, RecordFields};
use std::path::Path;

/// How a column's token is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    TimeStep,
    SpatialUnit,
    Classifier(usize),
    KyotoFlag(usize),
    Code,
    Measure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub role: ColumnRole,
}

const CLASSIFIER_NAMES: [&str; CLASSIFIER_SLOTS] =
    ["c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9", "c10"];

const KYOTO_FLAG_NAMES: [&str; KYOTO_FLAG_COUNT] = ["kf2", "kf3", "kf4", "kf5", "kf6"];

pub const POOL_COLUMNS: &[&str] = &[
    "SoftwoodMerch",
    "SoftwoodFoliage",
    "SoftwoodOther",
    "SoftwoodCoarseRoots",
    "SoftwoodFineRoots",
    "HardwoodMerch",
    "HardwoodFoliage",
    "HardwoodOther",
    "HardwoodCoarseRoots",
    "HardwoodFineRoots",
    "AboveGroundVeryFastSoil",
    "BelowGroundVeryFastSoil",
    "AboveGroundFastSoil",
    "BelowGroundFastSoil",
    "MediumSoil",
    "AboveGroundSlowSoil",
    "BelowGroundSlowSoil",
    "SoftwoodStemSnag",
    "SoftwoodBranchSnag",
    "HardwoodStemSnag",
    "HardwoodBranchSnag",
    "BlackCarbon",
    "Peat",
];

pub const FLUX_COLUMNS: &[&str] = &[
    "CO2Production",
    "CH4Production",
    "COProduction",
    "BioCO2Emission",
    "BioCH4Emission",
    "BioCOEmission",
    "DOMCO2Emission",
    "DOMCH4Emission",
    "DOMCOEmission",
    "SoftProduction",
    "HardProduction",
    "DOMProduction",
    "DeltaBiomass_AG",
    "DeltaBiomass_BG",
    "DeltaDOM",
    "BiomassToSoil",
    "DecayUDomCO2Emission",
    "DecayFDomCO2Emission",
    "DecayMDomCO2Emission",
    "DecaySDomCO2Emission",
    "DisturbanceCO2Production",
    "DisturbanceCH4Production",
    "DisturbanceCOProduction",
    "DisturbanceSoftProduction",
    "DisturbanceHardProduction",
    "DisturbanceDOMProduction",
    "DisturbanceBiomassToSoil",
    "DisturbanceMerchToAir",
    "DisturbanceFolToAir",
    "DisturbanceOthToAir",
    "DisturbanceCoarseToAir",
    "DisturbanceFineToAir",
    "DisturbanceDOMToAir",
    "DisturbanceMerchLitterInput",
    "DisturbanceFolLitterInput",
    "DisturbanceOthLitterInput",
    "DisturbanceCoarseLitterInput",
    "DisturbanceFineLitterInput",
    "GrossGrowth_AG",
    "GrossGrowth_BG",
    "NetPrimaryProduction",
    "HeterotrophicRespiration",
];

/// Snapshot columns between the kyoto flags and the pools (grouped lines 3
/// tail and 4)
const SNAPSHOT_STATE_CODES: &[&str] = &[
    "Age",
    "AgeClassID",
    "LastDistTypeID",
    "TimeSinceLastDist",
    "TimeSinceLandClassChange",
];

const SNAPSHOT_SITE_COLUMNS: &[(&str, ColumnRole)] = &[
    ("GrowthCurve1ID", ColumnRole::Code),
    ("GrowthCurve2ID", ColumnRole::Code),
    ("GrowthMultiplier", ColumnRole::Measure),
    ("RegenerationDelay", ColumnRole::Code),
    ("SoftwoodSpeciesID", ColumnRole::Code),
    ("HardwoodSpeciesID", ColumnRole::Code),
    ("EcoBoundaryID", ColumnRole::Code),
    ("AdminBoundaryID", ColumnRole::Code),
    ("MeanAnnualTemp", ColumnRole::Measure),
    ("SoftwoodMerchVolume", ColumnRole::Measure),
    ("HardwoodMerchVolume", ColumnRole::Measure),
    ("SoftwoodProportion", ColumnRole::Measure),
];

pub const SNAPSHOT_TOTAL_COLUMNS: &[&str] = &[
    "TotalBiomassC",
    "TotalDOMC",
    "TotalEcosystemC",
    "NPP",
    "NEP",
    "Rh",
];

/// Ordered column layout for one record type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    name: &'static str,
    columns: Vec<ColumnSpec>,
}

impl RecordLayout {
    /// Layout of an indicator file
    pub fn indicator(kind: IndicatorKind) -> Self {
        let mut columns = Vec::with_capacity(60);
        columns.push(spec("TimeStep", ColumnRole::TimeStep));
        columns.push(spec("SPUID", ColumnRole::SpatialUnit));
        push_classifiers(&mut columns);
        push_kyoto_flags(&mut columns);

        match kind {
            IndicatorKind::Age => {
                columns.push(spec("AgeClassID", ColumnRole::Code));
                push_measures(&mut columns, &["Area", "Biomass_C", "DOM_C"]);
            }
            IndicatorKind::Pool => push_measures(&mut columns, POOL_COLUMNS),
            IndicatorKind::Flux => {
                columns.push(spec("DistTypeID", ColumnRole::Code));
                push_measures(&mut columns, FLUX_COLUMNS);
            }
            IndicatorKind::Disturbance => {
                columns.push(spec("DistTypeID", ColumnRole::Code));
                push_measures(&mut columns, &["DistArea", "DistProduct"]);
            }
        }

        Self {
            name: kind.file_name(),
            columns,
        }
    }

    /// Canonical snapshot layout shared by both encodings
    pub fn snapshot() -> Self {
        let mut columns = Vec::with_capacity(66);
        columns.push(spec("TimeStep", ColumnRole::TimeStep));
        columns.push(spec("RecordID", ColumnRole::Code));
        columns.push(spec("SPUID", ColumnRole::SpatialUnit));
        columns.push(spec("Area", ColumnRole::Measure));
        push_classifiers(&mut columns);
        columns.push(spec("LandClassID", ColumnRole::Code));
        push_kyoto_flags(&mut columns);
        for name in SNAPSHOT_STATE_CODES {
            columns.push(spec(*name, ColumnRole::Code));
        }
        for (name, role) in SNAPSHOT_SITE_COLUMNS {
            columns.push(spec(*name, *role));
        }
        push_measures(&mut columns, POOL_COLUMNS);
        push_measures(&mut columns, SNAPSHOT_TOTAL_COLUMNS);

        Self {
            name: "snapshot",
            columns,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of tokens in one logical record
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Names of the integer code columns, in layout order
    pub fn code_names(&self) -> Vec<&'static str> {
        self.names_with(|role| role == ColumnRole::Code)
    }

    /// Names of the measure columns, in layout order
    pub fn measure_names(&self) -> Vec<&'static str> {
        self.names_with(|role| role == ColumnRole::Measure)
    }

    fn names_with(&self, predicate: impl Fn(ColumnRole) -> bool) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|column| predicate(column.role))
            .map(|column| column.name)
            .collect()
    }

    /// Parse one logical record's tokens. `line` is the 1-based line used in
    /// error messages.
    pub fn parse_fields(&self, tokens: &[&str], path: &Path, line: usize) -> Result<RecordFields> {
        if tokens.len() != self.width() {
            return Err(CbmError::MalformedLine {
                path: path.to_path_buf(),
                line,
                expected: self.width(),
                found: tokens.len(),
            });
        }

        let mut fields = RecordFields {
            timestep: 0,
            spatial_unit: 0,
            classifiers: ClassifierValues::unclassified(),
            kyoto_flags: [0; KYOTO_FLAG_COUNT],
            codes: Vec::new(),
            measures: Vec::new(),
        };

        for (column, token) in self.columns.iter().zip(tokens) {
            let invalid = || CbmError::InvalidValue {
                path: path.to_path_buf(),
                line,
                column: column.name.to_string(),
                value: token.to_string(),
            };

            match column.role {
                ColumnRole::TimeStep => {
                    fields.timestep = parse_int(token).ok_or_else(invalid)?;
                }
                ColumnRole::SpatialUnit => {
                    fields.spatial_unit = parse_int(token).ok_or_else(invalid)?;
                }
                ColumnRole::Classifier(slot) => {
                    let raw = if is_missing(token) {
                        None
                    } else {
                        Some(parse_int(token).ok_or_else(invalid)?)
                    };
                    fields.classifiers.0[slot] = ClassifierValues::normalize_raw(raw);
                }
                ColumnRole::KyotoFlag(slot) => {
                    fields.kyoto_flags[slot] = parse_int(token).ok_or_else(invalid)?;
                }
                ColumnRole::Code => fields.codes.push(parse_int(token).ok_or_else(invalid)?),
                ColumnRole::Measure => {
                    fields.measures.push(token.parse::<f64>().map_err(|_| invalid())?)
                }
            }
        }

        Ok(fields)
    }
}

fn spec(name: &'static str, role: ColumnRole) -> ColumnSpec {
    ColumnSpec { name, role }
}

fn push_classifiers(columns: &mut Vec<ColumnSpec>) {
    for (slot, name) in CLASSIFIER_NAMES.iter().enumerate() {
        columns.push(spec(*name, ColumnRole::Classifier(slot)));
    }
}

fn push_kyoto_flags(columns: &mut Vec<ColumnSpec>) {
    for (slot, name) in KYOTO_FLAG_NAMES.iter().enumerate() {
        columns.push(spec(*name, ColumnRole::KyotoFlag(slot)));
    }
}

fn push_measures(columns: &mut Vec<ColumnSpec>, names: &[&'static str]) {
    columns.extend(names.iter().map(|name| spec(*name, ColumnRole::Measure)));
}

pub fn classifier_column_names() -> [&'static str; CLASSIFIER_SLOTS] {
    CLASSIFIER_NAMES
}

/// Whether a raw token denotes an absent value
pub fn is_missing(token: &str) -> bool {
    let trimmed = token.trim();
    trimmed.is_empty()
        || MISSING_TOKENS
            .iter()
            .any(|missing| missing.eq_ignore_ascii_case(trimmed))
}

/// Parse an integer token, accepting integral floats such as "5.0"
pub fn parse_int(token: &str) -> Option<i32> {
    let trimmed = token.trim();
    if let Ok(value) = trimmed.parse::<i32>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::UNCLASSIFIED;
    use std::path::PathBuf;

    #[test]
    fn test_indicator_layout_widths() {
        assert_eq!(RecordLayout::indicator(IndicatorKind::Age).width(), 21);
        assert_eq!(RecordLayout::indicator(IndicatorKind::Pool).width(), 40);
        assert_eq!(RecordLayout::indicator(IndicatorKind::Flux).width(), 60);
        assert_eq!(RecordLayout::indicator(IndicatorKind::Disturbance).width(), 20);
    }

    #[test]
    fn test_snapshot_layout_has_canonical_width() {
        let layout = RecordLayout::snapshot();
        assert_eq!(layout.width(), 66);
        let classifier_count = layout
            .columns()
            .iter()
            .filter(|column| matches!(column.role, ColumnRole::Classifier(_)))
            .count();
        assert_eq!(classifier_count, CLASSIFIER_SLOTS);
    }

    #[test]
    fn test_parse_fields_normalizes_classifiers() {
        let layout = RecordLayout::indicator(IndicatorKind::Disturbance);
        let line = "3 17 2 0 -1 NA 5 1 1 1 1 1 0 0 0 0 1 4 120.5 33.2";
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let fields = layout
            .parse_fields(&tokens, &PathBuf::from("distind.out"), 1)
            .unwrap();

        assert_eq!(fields.timestep, 3);
        assert_eq!(fields.spatial_unit, 17);
        assert_eq!(fields.classifiers.0[0], 2);
        assert_eq!(fields.classifiers.0[1], UNCLASSIFIED);
        assert_eq!(fields.classifiers.0[2], UNCLASSIFIED);
        assert_eq!(fields.classifiers.0[3], UNCLASSIFIED);
        assert_eq!(fields.kyoto_flags, [0, 0, 0, 0, 1]);
        assert_eq!(fields.codes, vec![4]);
        assert_eq!(fields.measures, vec![120.5, 33.2]);
    }

    #[test]
    fn test_parse_fields_reports_token_mismatch() {
        let layout = RecordLayout::indicator(IndicatorKind::Age);
        let err = layout
            .parse_fields(&["1", "2", "3"], &PathBuf::from("ageind.out"), 7)
            .unwrap_err();

        match err {
            CbmError::MalformedLine {
                line,
                expected,
                found,
                ..
            } => {
                assert_eq!(line, 7);
                assert_eq!(expected, 21);
                assert_eq!(found, 3);
            }
            other => panic!("Expected MalformedLine, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_int_accepts_integral_floats() {
        assert_eq!(parse_int("5"), Some(5));
        assert_eq!(parse_int("5.0"), Some(5));
        assert_eq!(parse_int("5.5"), None);
        assert_eq!(parse_int("abc"), None);
    }
}
