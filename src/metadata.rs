//! Project metadata readers for CSV inputs.
//!
//! Reads the reference table of known classifier combinations and the
//! disturbance event definitions that reconciliation is checked against.

use crate::constants::{CLASSIFIER_SET_ID_COLUMN, CLASSIFIER_SLOTS};
use crate::error::{CbmError, Result};
use crate::layout::classifier_column_names;
use crate::models::{DisturbanceEventDefinition, ReferenceClassifierSet, TargetKind};
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Columns of the event definition file, in order
pub const EVENT_DEFINITION_COLUMNS: [&str; 10] = [
    "EventID",
    "GroupScenarioID",
    "SpatialUnitGroupID",
    "TimeStep",
    "DisturbanceTypeID",
    "DisturbanceGroup",
    "SortType",
    "Efficiency",
    "TargetType",
    "Target",
];

fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(CbmError::Metadata {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

fn require_columns(df: &DataFrame, path: &Path, columns: &[&str]) -> Result<()> {
    let present = df.get_column_names_str();
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CbmError::Metadata {
            path: path.to_path_buf(),
            reason: format!("missing columns: {}", missing.join(", ")),
        })
    }
}

fn int64_values(df: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let cast = df.column(column)?.cast(&DataType::Int64)?;
    Ok(cast.as_materialized_series().i64()?.into_iter().collect())
}

fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let cast = df.column(column)?.cast(&DataType::Float64)?;
    Ok(cast.as_materialized_series().f64()?.into_iter().collect())
}

fn text_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let cast = df.column(column)?.cast(&DataType::String)?;
    Ok(cast
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Read `ClassifierSetID,c1..c10` rows. Classifier values may be null; rows
/// without an id are skipped.
pub fn read_classifier_reference(path: &Path) -> Result<Vec<ReferenceClassifierSet>> {
    let df = read_csv(path)?;
    let rows = classifier_reference_from_frame(&df, path)?;
    info!(
        "Read {} reference classifier sets from {}",
        rows.len(),
        path.display()
    );
    Ok(rows)
}

pub fn classifier_reference_from_frame(
    df: &DataFrame,
    path: &Path,
) -> Result<Vec<ReferenceClassifierSet>> {
    let names = classifier_column_names();
    let mut required = vec![CLASSIFIER_SET_ID_COLUMN];
    required.extend(names.iter().copied());
    require_columns(df, path, &required)?;

    let ids = int64_values(df, CLASSIFIER_SET_ID_COLUMN)?;
    let slots = names
        .iter()
        .map(|name| int64_values(df, name))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(ids.len());
    for (row, id) in ids.into_iter().enumerate() {
        let Some(id) = id else {
            warn!("Skipping reference row {} in {}: no id", row + 1, path.display());
            continue;
        };
        let mut values = [None; CLASSIFIER_SLOTS];
        for (slot, column) in values.iter_mut().zip(&slots) {
            *slot = column[row].and_then(|v| i32::try_from(v).ok());
        }
        rows.push(ReferenceClassifierSet { id, values });
    }
    Ok(rows)
}

/// Read disturbance event definitions
pub fn read_event_definitions(path: &Path) -> Result<Vec<DisturbanceEventDefinition>> {
    let df = read_csv(path)?;
    let definitions = event_definitions_from_frame(&df, path)?;
    info!(
        "Read {} disturbance event definitions from {}",
        definitions.len(),
        path.display()
    );
    Ok(definitions)
}

pub fn event_definitions_from_frame(
    df: &DataFrame,
    path: &Path,
) -> Result<Vec<DisturbanceEventDefinition>> {
    require_columns(df, path, &EVENT_DEFINITION_COLUMNS)?;

    let int_columns = [
        "EventID",
        "GroupScenarioID",
        "SpatialUnitGroupID",
        "TimeStep",
        "DisturbanceTypeID",
        "DisturbanceGroup",
        "SortType",
    ]
    .iter()
    .map(|name| int64_values(df, name))
    .collect::<Result<Vec<_>>>()?;
    let efficiency = float_values(df, "Efficiency")?;
    let target_type = text_values(df, "TargetType")?;
    let target = float_values(df, "Target")?;

    let invalid = |row: usize, reason: String| CbmError::Metadata {
        path: path.to_path_buf(),
        reason: format!("row {}: {}", row + 1, reason),
    };

    (0..df.height())
        .map(|row| {
            let mut ints = [0i64; 7];
            for (i, column) in int_columns.iter().enumerate() {
                ints[i] = column[row].ok_or_else(|| {
                    invalid(row, format!("{} is missing", EVENT_DEFINITION_COLUMNS[i]))
                })?;
            }
            let label = target_type[row].as_deref().unwrap_or_default();
            let target_kind = TargetKind::from_label(label)
                .ok_or_else(|| invalid(row, format!("unknown target type '{}'", label)))?;
            let target = target[row].ok_or_else(|| invalid(row, "Target is missing".to_string()))?;

            Ok(DisturbanceEventDefinition {
                event_id: ints[0],
                group_scenario_id: ints[1],
                spatial_unit_group: ints[2],
                timestep: ints[3],
                disturbance_type: ints[4],
                disturbance_group: ints[5],
                sort_type: ints[6],
                efficiency: efficiency[row].unwrap_or(1.0),
                target_kind,
                target,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_classifier_reference_with_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classifiers.csv");
        fs::write(
            &path,
            "ClassifierSetID,c1,c2,c3,c4,c5,c6,c7,c8,c9,c10\n\
             4,2,3,1,1,1,1,1,1,1,1\n\
             7,5,,1,1,1,1,1,1,1,1\n",
        )
        .unwrap();

        let rows = read_classifier_reference(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 4);
        assert_eq!(rows[0].values[1], Some(3));
        assert_eq!(rows[1].values[1], None);
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classifiers.csv");
        fs::write(&path, "ClassifierSetID,c1\n1,2\n").unwrap();

        match read_classifier_reference(&path) {
            Err(CbmError::Metadata { reason, .. }) => assert!(reason.contains("c10")),
            other => panic!("Expected Metadata error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_event_definitions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(
            &path,
            "EventID,GroupScenarioID,SpatialUnitGroupID,TimeStep,DisturbanceTypeID,\
             DisturbanceGroup,SortType,Efficiency,TargetType,Target\n\
             1,1,42,3,1,1,2,1.0,A,150.5\n\
             2,1,42,3,1,1,2,0.8,M,900\n",
        )
        .unwrap();

        let definitions = read_event_definitions(&path).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].target_kind, TargetKind::Area);
        assert_eq!(definitions[0].spatial_unit_group, 42);
        assert_eq!(definitions[1].target_kind, TargetKind::MerchantableCarbon);
        assert_eq!(definitions[1].target, 900.0);
    }

    #[test]
    fn test_unknown_target_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(
            &path,
            "EventID,GroupScenarioID,SpatialUnitGroupID,TimeStep,DisturbanceTypeID,\
             DisturbanceGroup,SortType,Efficiency,TargetType,Target\n\
             1,1,42,3,1,1,2,1.0,X,150.5\n",
        )
        .unwrap();

        assert!(matches!(
            read_event_definitions(&path),
            Err(CbmError::Metadata { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_event_definitions(Path::new("/nonexistent/events.csv")),
            Err(CbmError::Metadata { .. })
        ));
    }
}
