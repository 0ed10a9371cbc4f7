//! Reconciliation stage of the processing pipeline

use super::fixtures::{i64_values, standard_run};
use crate::config::CbmConfig;
use crate::constants::tables;
use crate::loader::MemorySink;
use crate::models::{DisturbanceEventDefinition, ReconciliationStatus, TargetKind};
use crate::processor::RunProcessor;
use tempfile::TempDir;

fn definition(event_id: i64, target_kind: TargetKind, target: f64) -> DisturbanceEventDefinition {
    DisturbanceEventDefinition {
        event_id,
        group_scenario_id: 1,
        spatial_unit_group: 12,
        timestep: 1,
        disturbance_type: 1,
        disturbance_group: 1,
        sort_type: 2,
        efficiency: 1.0,
        target_kind,
        target,
    }
}

fn run_with(definitions: Vec<DisturbanceEventDefinition>) -> (MemorySink, ReconciliationStatus) {
    let temp_dir = TempDir::new().unwrap();
    let run = standard_run(&temp_dir);

    let (sink, stats) = RunProcessor::new(run, None)
        .unwrap()
        .with_config(CbmConfig::default().without_progress())
        .with_event_definitions(definitions)
        .run_with_sink(MemorySink::new())
        .unwrap();
    (sink, stats.reconciliation)
}

#[test]
fn test_definitions_are_merged_with_log_entries() {
    let (sink, status) = run_with(vec![
        definition(2, TargetKind::MerchantableCarbon, 400.0),
        definition(1, TargetKind::Area, 25.0),
    ]);

    assert_eq!(status, ReconciliationStatus::Completed { rows: 2, warnings: 0 });

    let merged = sink.table(tables::RECONCILIATION).unwrap();
    assert_eq!(merged.height(), 2);
    assert_eq!(i64_values(merged, "DisturbanceReconciliationID"), vec![1, 2]);
    assert_eq!(i64_values(merged, "EventID"), vec![1, 2]);
    assert_eq!(i64_values(merged, "Simulation_RecordsChanged"), vec![6, 6]);

    let area = merged.column("Simulation_TargetArea").unwrap();
    assert_eq!(area.null_count(), 1);
    let biomass = merged.column("Simulation_TargetBiomassC").unwrap();
    assert_eq!(biomass.null_count(), 1);
}

#[test]
fn test_unmatched_definitions_produce_warnings() {
    let (sink, status) = run_with(vec![
        definition(1, TargetKind::Area, 25.0),
        definition(2, TargetKind::Area, 30.0),
    ]);

    // Only one area entry in the log: the larger event has nothing left to
    // match, and its target still counts towards the configured area sum
    assert_eq!(status, ReconciliationStatus::Completed { rows: 1, warnings: 2 });
    let merged = sink.table(tables::RECONCILIATION).unwrap();
    assert_eq!(i64_values(merged, "EventID"), vec![1]);
}

#[test]
fn test_proportion_definitions_skip_the_stage() {
    let (sink, status) = run_with(vec![
        definition(1, TargetKind::Area, 25.0),
        definition(2, TargetKind::Proportion, 0.25),
    ]);

    assert_eq!(
        status,
        ReconciliationStatus::Skipped {
            proportion_definitions: 1
        }
    );
    assert!(sink.table(tables::RECONCILIATION).is_none());
    assert_eq!(sink.table(tables::RECONCILIATION_LOG).unwrap().height(), 2);
}
