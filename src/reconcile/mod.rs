//! Disturbance reconciliation.
//!
//! Pairs configured disturbance events with the entries the engine wrote
//! to the run log. Within each (timestep, disturbance type, disturbance
//! group) pool and target kind, events and log entries are sorted by
//! magnitude and each event takes the closest unconsumed entry. Runs that
//! schedule proportion-based targets are not reconciled.

pub mod matching;
pub mod validation;

pub use validation::ReconciliationWarning;

use crate::constants::{SIMULATION_PREFIX, log_keys};
use crate::error::Result;
use crate::models::{DisturbanceEventDefinition, TargetKind};
use crate::report_log::{ReconciliationLog, ReconciliationLogEntry};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Realized values taken from the matched log entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RealizedFields {
    pub disturbance_group: i64,
    pub sort_type: i64,
    pub target_type: Option<String>,
    pub target_area: Option<f64>,
    pub eligible_area: Option<f64>,
    pub surplus_area: Option<f64>,
    pub area_proportion: Option<f64>,
    pub records_eligible: i64,
    pub records_changed: i64,
    pub records_sorted: i64,
    pub target_biomass_c: Option<f64>,
    pub surplus_biomass_c: Option<f64>,
    pub biomass_c_proportion: Option<f64>,
}

impl RealizedFields {
    fn from_entry(entry: &ReconciliationLogEntry<'_>) -> Self {
        Self {
            disturbance_group: entry.int(log_keys::DISTURBANCE_GROUP).unwrap_or(0),
            sort_type: entry.int(log_keys::SORT_TYPE).unwrap_or(0),
            target_type: entry.text(log_keys::TARGET_TYPE).map(str::to_string),
            target_area: entry.float(log_keys::TARGET_AREA),
            eligible_area: entry.float(log_keys::ELIGIBLE_AREA),
            surplus_area: entry.float(log_keys::SURPLUS_AREA),
            area_proportion: entry.float(log_keys::AREA_PROPORTION),
            records_eligible: entry.int(log_keys::RECORDS_ELIGIBLE).unwrap_or(0),
            records_changed: entry.int(log_keys::RECORDS_CHANGED).unwrap_or(0),
            records_sorted: entry.int(log_keys::RECORDS_SORTED).unwrap_or(0),
            target_biomass_c: entry.float(log_keys::TARGET_BIOMASS_C),
            surplus_biomass_c: entry.float(log_keys::SURPLUS_BIOMASS_C),
            biomass_c_proportion: entry.float(log_keys::BIOMASS_C_PROPORTION),
        }
    }

    /// Realized target for the given kind
    pub fn magnitude(&self, kind: TargetKind) -> Option<f64> {
        match kind {
            TargetKind::Area => self.target_area,
            TargetKind::MerchantableCarbon => self.target_biomass_c,
            TargetKind::Proportion => None,
        }
    }
}

/// A definition joined with the log entry it was matched to
#[derive(Debug, Clone, PartialEq)]
pub struct MergedReconciliationRow {
    pub definition: DisturbanceEventDefinition,
    pub realized: RealizedFields,
    /// Position of the matched block in the run log
    pub log_index: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconciliationReport {
    pub rows: Vec<MergedReconciliationRow>,
    pub warnings: Vec<ReconciliationWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    /// Proportion-based definitions are present; nothing was matched
    Skipped { proportion_definitions: usize },
    Reconciled(ReconciliationReport),
}

type GroupKey = (i64, i64, i64);

#[derive(Debug, Clone)]
pub struct DisturbanceReconciler {
    relative_tolerance: f64,
}

impl DisturbanceReconciler {
    pub fn new(relative_tolerance: f64) -> Self {
        Self { relative_tolerance }
    }

    pub fn reconcile(
        &self,
        definitions: &[DisturbanceEventDefinition],
        log: &ReconciliationLog,
    ) -> ReconciliationOutcome {
        let proportion_definitions = definitions
            .iter()
            .filter(|d| d.target_kind == TargetKind::Proportion)
            .count();
        if proportion_definitions > 0 {
            warn!(
                "Skipping disturbance reconciliation: {} proportion-based event definitions",
                proportion_definitions
            );
            return ReconciliationOutcome::Skipped {
                proportion_definitions,
            };
        }

        let mut warnings = Vec::new();
        let mut log_pools: BTreeMap<(TargetKind, GroupKey), Vec<ReconciliationLogEntry<'_>>> =
            BTreeMap::new();
        for entry in log.entries() {
            let label = entry.text(log_keys::TARGET_TYPE);
            match log_target_kind(&entry, label) {
                Some(TargetKind::Proportion) => {
                    debug!("Ignoring proportion log entry {}", entry.index());
                }
                Some(kind) => log_pools
                    .entry((kind, log_group(&entry)))
                    .or_default()
                    .push(entry),
                None => warnings.push(ReconciliationWarning::UnknownLogTargetType {
                    log_index: entry.index(),
                    label: label.map(str::to_string),
                }),
            }
        }

        let mut definition_pools: BTreeMap<
            (TargetKind, GroupKey),
            Vec<&DisturbanceEventDefinition>,
        > = BTreeMap::new();
        for definition in definitions {
            definition_pools
                .entry((definition.target_kind, definition_group(definition)))
                .or_default()
                .push(definition);
        }

        let mut rows = Vec::with_capacity(definitions.len());
        for (pool_key, pool) in &definition_pools {
            let (kind, _) = *pool_key;
            let entries = log_pools.get(pool_key).map(Vec::as_slice).unwrap_or(&[]);
            rows.extend(match_pool(kind, pool, entries));
        }

        rows.sort_by_key(|row| {
            let d = &row.definition;
            (d.timestep, d.spatial_unit_group, d.group_scenario_id, d.event_id)
        });

        for warning in &warnings {
            warn!("Disturbance reconciliation: {}", warning);
        }
        warnings.extend(validation::validate(
            definitions,
            &rows,
            self.relative_tolerance,
        ));

        info!(
            "Reconciled {} of {} disturbance events ({} warnings)",
            rows.len(),
            definitions.len(),
            warnings.len()
        );
        ReconciliationOutcome::Reconciled(ReconciliationReport { rows, warnings })
    }
}

fn definition_group(definition: &DisturbanceEventDefinition) -> GroupKey {
    (
        definition.timestep,
        definition.disturbance_type,
        definition.disturbance_group,
    )
}

/// Kind of a log entry from its `Target Type` label, or failing that from
/// whichever single target column it carries
fn log_target_kind(
    entry: &ReconciliationLogEntry<'_>,
    label: Option<&str>,
) -> Option<TargetKind> {
    if let Some(kind) = label.and_then(TargetKind::from_label) {
        return Some(kind);
    }
    match (
        entry.float(log_keys::TARGET_AREA),
        entry.float(log_keys::TARGET_BIOMASS_C),
    ) {
        (Some(_), None) => Some(TargetKind::Area),
        (None, Some(_)) => Some(TargetKind::MerchantableCarbon),
        _ => None,
    }
}

fn log_group(entry: &ReconciliationLogEntry<'_>) -> GroupKey {
    (
        entry.int(log_keys::TIMESTEP).unwrap_or(0),
        entry.int(log_keys::DISTURBANCE_TYPE).unwrap_or(0),
        entry.int(log_keys::DISTURBANCE_GROUP).unwrap_or(0),
    )
}

fn match_pool(
    kind: TargetKind,
    definitions: &[&DisturbanceEventDefinition],
    entries: &[ReconciliationLogEntry<'_>],
) -> Vec<MergedReconciliationRow> {
    let definition_order =
        matching::magnitude_order(&definitions.iter().map(|d| Some(d.target)).collect::<Vec<_>>());
    let entry_magnitudes: Vec<Option<f64>> = entries
        .iter()
        .map(|e| RealizedFields::from_entry(e).magnitude(kind))
        .collect();
    let entry_order = matching::magnitude_order(&entry_magnitudes);

    let targets: Vec<f64> = definition_order
        .iter()
        .map(|&i| definitions[i].target)
        .collect();
    let candidates: Vec<Option<f64>> = entry_order.iter().map(|&i| entry_magnitudes[i]).collect();

    matching::nearest_match(&targets, &candidates)
        .into_iter()
        .zip(&definition_order)
        .filter_map(|(candidate, &definition_index)| {
            let entry = &entries[entry_order[candidate?]];
            Some(MergedReconciliationRow {
                definition: definitions[definition_index].clone(),
                realized: RealizedFields::from_entry(entry),
                log_index: entry.index(),
            })
        })
        .collect()
}

fn simulation(name: &str) -> PlSmallStr {
    format!("{SIMULATION_PREFIX}{name}").into()
}

impl ReconciliationReport {
    /// Merged table: definition fields, then realized fields prefixed `Simulation_`
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let rows = &self.rows;
        let def_int = |name: &str, f: fn(&DisturbanceEventDefinition) -> i64| {
            Column::new(name.into(), rows.iter().map(|r| f(&r.definition)).collect::<Vec<i64>>())
        };
        let real_int = |name: &str, f: fn(&RealizedFields) -> i64| {
            Column::new(simulation(name), rows.iter().map(|r| f(&r.realized)).collect::<Vec<i64>>())
        };
        let real_float = |name: &str, f: fn(&RealizedFields) -> Option<f64>| {
            Column::new(
                simulation(name),
                rows.iter().map(|r| f(&r.realized)).collect::<Vec<Option<f64>>>(),
            )
        };

        let columns = vec![
            def_int("EventID", |d| d.event_id),
            def_int("GroupScenarioID", |d| d.group_scenario_id),
            def_int("SpatialUnitGroupID", |d| d.spatial_unit_group),
            def_int("TimeStep", |d| d.timestep),
            def_int("DisturbanceTypeID", |d| d.disturbance_type),
            def_int("DisturbanceGroup", |d| d.disturbance_group),
            def_int("SortType", |d| d.sort_type),
            Column::new(
                "Efficiency".into(),
                rows.iter().map(|r| r.definition.efficiency).collect::<Vec<f64>>(),
            ),
            Column::new(
                "TargetType".into(),
                rows.iter()
                    .map(|r| r.definition.target_kind.code())
                    .collect::<Vec<&str>>(),
            ),
            Column::new(
                "Target".into(),
                rows.iter().map(|r| r.definition.target).collect::<Vec<f64>>(),
            ),
            real_int("DisturbanceGroup", |r| r.disturbance_group),
            real_int("SortType", |r| r.sort_type),
            Column::new(
                simulation("TargetType"),
                rows.iter()
                    .map(|r| r.realized.target_type.clone())
                    .collect::<Vec<Option<String>>>(),
            ),
            real_float("TargetArea", |r| r.target_area),
            real_float("EligibleArea", |r| r.eligible_area),
            real_float("SurplusArea", |r| r.surplus_area),
            real_float("AreaProportion", |r| r.area_proportion),
            real_int("RecordsEligible", |r| r.records_eligible),
            real_int("RecordsChanged", |r| r.records_changed),
            real_int("RecordsSorted", |r| r.records_sorted),
            real_float("TargetBiomassC", |r| r.target_biomass_c),
            real_float("SurplusBiomassC", |r| r.surplus_biomass_c),
            real_float("BiomassCProportion", |r| r.biomass_c_proportion),
        ];
        Ok(DataFrame::new(columns)?)
    }
}
