//! Aggregate checks on merged reconciliation rows. Mismatches are reported
//! as warnings; they never stop the pipeline.

use super::MergedReconciliationRow;
use crate::models::{DisturbanceEventDefinition, TargetKind};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationWarning {
    /// Not every definition found a log entry
    CountMismatch { definitions: usize, matched: usize },
    /// Configured and realized target sums differ beyond tolerance
    TargetSumMismatch {
        kind: TargetKind,
        configured: f64,
        realized: f64,
    },
    /// A log entry whose target type is neither area nor merchantable carbon
    UnknownLogTargetType {
        log_index: usize,
        label: Option<String>,
    },
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationWarning::CountMismatch {
                definitions,
                matched,
            } => write!(
                f,
                "{} event definitions but {} matched log entries",
                definitions, matched
            ),
            ReconciliationWarning::TargetSumMismatch {
                kind,
                configured,
                realized,
            } => write!(
                f,
                "{} targets sum to {} but the log reports {}",
                kind, configured, realized
            ),
            ReconciliationWarning::UnknownLogTargetType { log_index, label } => write!(
                f,
                "log entry {} has unrecognised target type {:?}",
                log_index, label
            ),
        }
    }
}

fn within_tolerance(configured: f64, realized: f64, relative_tolerance: f64) -> bool {
    let scale = configured.abs().max(realized.abs());
    (configured - realized).abs() <= relative_tolerance * scale
}

/// Compare the definition count with the matched rows, and each kind's
/// configured target sum over all definitions with the realized sum of
/// its matched rows
pub fn validate(
    definitions: &[DisturbanceEventDefinition],
    rows: &[MergedReconciliationRow],
    relative_tolerance: f64,
) -> Vec<ReconciliationWarning> {
    let mut warnings = Vec::new();

    if definitions.len() != rows.len() {
        warnings.push(ReconciliationWarning::CountMismatch {
            definitions: definitions.len(),
            matched: rows.len(),
        });
    }

    for kind in [TargetKind::Area, TargetKind::MerchantableCarbon] {
        let configured: Vec<f64> = definitions
            .iter()
            .filter(|d| d.target_kind == kind)
            .map(|d| d.target)
            .collect();
        if configured.is_empty() {
            continue;
        }
        let configured: f64 = configured.iter().sum();
        let realized: f64 = rows
            .iter()
            .filter(|row| row.definition.target_kind == kind)
            .filter_map(|row| row.realized.magnitude(kind))
            .sum();
        if !within_tolerance(configured, realized, relative_tolerance) {
            warnings.push(ReconciliationWarning::TargetSumMismatch {
                kind,
                configured,
                realized,
            });
        }
    }

    for warning in &warnings {
        warn!("Disturbance reconciliation: {}", warning);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::RealizedFields;

    #[test]
    fn test_tolerance_is_relative() {
        assert!(within_tolerance(1_000_000.0, 1_000_001.0, 1e-5));
        assert!(!within_tolerance(10.0, 10.01, 1e-5));
        assert!(within_tolerance(0.0, 0.0, 1e-5));
    }

    #[test]
    fn test_warning_messages() {
        let warning = ReconciliationWarning::CountMismatch {
            definitions: 3,
            matched: 2,
        };
        assert_eq!(
            warning.to_string(),
            "3 event definitions but 2 matched log entries"
        );
    }

    fn area_definition(event_id: i64, target: f64) -> DisturbanceEventDefinition {
        DisturbanceEventDefinition {
            event_id,
            group_scenario_id: 1,
            spatial_unit_group: 1,
            timestep: 1,
            disturbance_type: 1,
            disturbance_group: 1,
            sort_type: 1,
            efficiency: 1.0,
            target_kind: TargetKind::Area,
            target,
        }
    }

    #[test]
    fn test_unmatched_definitions_count_towards_configured_sum() {
        let definitions = [area_definition(1, 40.0), area_definition(2, 60.0)];
        let rows = [MergedReconciliationRow {
            definition: definitions[0].clone(),
            realized: RealizedFields {
                target_area: Some(40.0),
                ..Default::default()
            },
            log_index: 0,
        }];

        let warnings = validate(&definitions, &rows, 1e-5);
        assert_eq!(
            warnings,
            vec![
                ReconciliationWarning::CountMismatch {
                    definitions: 2,
                    matched: 1
                },
                ReconciliationWarning::TargetSumMismatch {
                    kind: TargetKind::Area,
                    configured: 100.0,
                    realized: 40.0
                },
            ]
        );
    }

    #[test]
    fn test_matching_sums_raise_no_warning() {
        let definitions = [area_definition(1, 40.0)];
        let rows = [MergedReconciliationRow {
            definition: definitions[0].clone(),
            realized: RealizedFields {
                target_area: Some(40.000001),
                ..Default::default()
            },
            log_index: 0,
        }];

        assert!(validate(&definitions, &rows, 1e-5).is_empty());
    }
}
