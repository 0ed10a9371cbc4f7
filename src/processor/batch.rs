//! Record-to-DataFrame batch building.
//!
//! Columns follow the record layout, with the ten classifier slots replaced
//! by a single `ClassifierSetID` column at the position of `c1`.

use crate::constants::{CLASSIFIER_SET_ID_COLUMN, KYOTO_FLAG_COUNT};
use crate::error::Result;
use crate::layout::{ColumnRole, RecordLayout};
use crate::models::RecordFields;
use polars::prelude::*;

/// Column buffers for one table, drained into a `DataFrame` per chunk
#[derive(Debug)]
pub struct BatchBuilder {
    layout: RecordLayout,
    timestep: Vec<i32>,
    spatial_unit: Vec<i32>,
    classifier_set: Vec<i64>,
    kyoto_flags: [Vec<i32>; KYOTO_FLAG_COUNT],
    codes: Vec<Vec<i32>>,
    measures: Vec<Vec<f64>>,
}

impl BatchBuilder {
    pub fn new(layout: RecordLayout) -> Self {
        let codes = vec![Vec::new(); layout.code_names().len()];
        let measures = vec![Vec::new(); layout.measure_names().len()];
        Self {
            layout,
            timestep: Vec::new(),
            spatial_unit: Vec::new(),
            classifier_set: Vec::new(),
            kyoto_flags: Default::default(),
            codes,
            measures,
        }
    }

    pub fn len(&self) -> usize {
        self.timestep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestep.is_empty()
    }

    /// Buffer one record with its interned classifier set id
    pub fn push(&mut self, fields: &RecordFields, classifier_set_id: i64) {
        self.timestep.push(fields.timestep);
        self.spatial_unit.push(fields.spatial_unit);
        self.classifier_set.push(classifier_set_id);
        for (column, flag) in self.kyoto_flags.iter_mut().zip(fields.kyoto_flags) {
            column.push(flag);
        }
        for (column, code) in self.codes.iter_mut().zip(&fields.codes) {
            column.push(*code);
        }
        for (column, measure) in self.measures.iter_mut().zip(&fields.measures) {
            column.push(*measure);
        }
    }

    /// Drain the buffered rows into a frame, leaving the builder empty
    pub fn take(&mut self) -> Result<DataFrame> {
        let mut code_index = 0;
        let mut measure_index = 0;
        let mut columns = Vec::with_capacity(self.layout.width());

        for spec in self.layout.columns() {
            let name: PlSmallStr = spec.name.into();
            match spec.role {
                ColumnRole::TimeStep => {
                    columns.push(Column::new(name, std::mem::take(&mut self.timestep)))
                }
                ColumnRole::SpatialUnit => {
                    columns.push(Column::new(name, std::mem::take(&mut self.spatial_unit)))
                }
                ColumnRole::Classifier(0) => columns.push(Column::new(
                    CLASSIFIER_SET_ID_COLUMN.into(),
                    std::mem::take(&mut self.classifier_set),
                )),
                ColumnRole::Classifier(_) => {}
                ColumnRole::KyotoFlag(slot) => columns.push(Column::new(
                    name,
                    std::mem::take(&mut self.kyoto_flags[slot]),
                )),
                ColumnRole::Code => {
                    columns.push(Column::new(
                        name,
                        std::mem::take(&mut self.codes[code_index]),
                    ));
                    code_index += 1;
                }
                ColumnRole::Measure => {
                    columns.push(Column::new(
                        name,
                        std::mem::take(&mut self.measures[measure_index]),
                    ));
                    measure_index += 1;
                }
            }
        }

        Ok(DataFrame::new(columns)?)
    }
}
