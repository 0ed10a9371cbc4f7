//! Classifier set interning.
//!
//! Deduplicates 10-slot classifier tuples into integer surrogate ids. The
//! mapping is content-addressed and append-only: an id, once assigned, is
//! never reassigned, and two distinct tuples never share an id. One
//! interner belongs to exactly one pipeline run.

use crate::constants::{CLASSIFIER_SET_ID_COLUMN, CLASSIFIER_SLOTS};
use crate::error::Result;
use crate::layout::classifier_column_names;
use crate::models::{ClassifierValues, ReferenceClassifierSet};
use polars::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

type ClassifierKey = [i32; CLASSIFIER_SLOTS];

/// Outcome of pre-seeding from the reference table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub accepted: usize,
    pub missing_values: usize,
    pub duplicate_tuples: usize,
    pub duplicate_ids: usize,
}

impl SeedReport {
    pub fn dropped(&self) -> usize {
        self.missing_values + self.duplicate_tuples + self.duplicate_ids
    }
}

/// Run-scoped classifier set interner
#[derive(Debug, Default)]
pub struct ClassifierSetInterner {
    ids: HashMap<ClassifierKey, i64>,
    /// Every known set in assignment order
    sets: Vec<(i64, ClassifierKey)>,
    max_id: i64,
    seeded: usize,
}

impl ClassifierSetInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed with already-known combinations. Rows with null values, and
    /// rows repeating a seeded tuple or id, are dropped with a warning.
    pub fn seed<I>(&mut self, rows: I) -> SeedReport
    where
        I: IntoIterator<Item = ReferenceClassifierSet>,
    {
        let mut report = SeedReport::default();
        let mut seeded_ids: HashMap<i64, ClassifierKey> =
            self.sets.iter().map(|(id, key)| (*id, *key)).collect();

        for row in rows {
            let Some(raw) = complete_values(&row.values) else {
                warn!(
                    "Dropping reference classifier set {}: missing classifier values",
                    row.id
                );
                report.missing_values += 1;
                continue;
            };
            let key = ClassifierValues(raw).interning_key();

            if let Some(existing) = self.ids.get(&key) {
                warn!(
                    "Dropping reference classifier set {}: duplicates set {}",
                    row.id, existing
                );
                report.duplicate_tuples += 1;
                continue;
            }
            if seeded_ids.contains_key(&row.id) {
                warn!(
                    "Dropping reference classifier set {}: id already bound to another tuple",
                    row.id
                );
                report.duplicate_ids += 1;
                continue;
            }

            seeded_ids.insert(row.id, key);
            self.insert(row.id, key);
            report.accepted += 1;
        }

        self.seeded += report.accepted;
        debug!(
            "Seeded {} classifier sets ({} dropped), next id {}",
            report.accepted,
            report.dropped(),
            self.max_id + 1
        );
        report
    }

    /// Id for the tuple, assigning `max_existing_id + 1` when unseen
    pub fn get_or_assign(&mut self, values: &ClassifierValues) -> i64 {
        let key = values.interning_key();
        match self.ids.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = self.max_id + 1;
                entry.insert(id);
                self.sets.push((id, key));
                self.max_id = id;
                id
            }
        }
    }

    /// Id for the tuple without assigning
    pub fn get(&self, values: &ClassifierValues) -> Option<i64> {
        self.ids.get(&values.interning_key()).copied()
    }

    fn insert(&mut self, id: i64, key: ClassifierKey) {
        self.ids.insert(key, id);
        self.sets.push((id, key));
        self.max_id = self.max_id.max(id);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn seeded(&self) -> usize {
        self.seeded
    }

    /// Sets created by `get_or_assign` during this run
    pub fn assigned_this_session(&self) -> usize {
        self.sets.len() - self.seeded
    }

    /// All known sets as a `ClassifierSetID, c1..c10` table ordered by id
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut sets = self.sets.clone();
        sets.sort_by_key(|(id, _)| *id);

        let mut columns = Vec::with_capacity(CLASSIFIER_SLOTS + 1);
        columns.push(Column::new(
            CLASSIFIER_SET_ID_COLUMN.into(),
            sets.iter().map(|(id, _)| *id).collect::<Vec<i64>>(),
        ));
        for (slot, name) in classifier_column_names().iter().enumerate() {
            columns.push(Column::new(
                (*name).into(),
                sets.iter().map(|(_, key)| key[slot]).collect::<Vec<i32>>(),
            ));
        }
        Ok(DataFrame::new(columns)?)
    }
}

fn complete_values(values: &[Option<i32>; CLASSIFIER_SLOTS]) -> Option<ClassifierKey> {
    let mut key = [0; CLASSIFIER_SLOTS];
    for (slot, value) in key.iter_mut().zip(values) {
        *slot = (*value)?;
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(head: &[i32]) -> ClassifierValues {
        let mut key = [1; CLASSIFIER_SLOTS];
        key[..head.len()].copy_from_slice(head);
        ClassifierValues(key)
    }

    fn reference(id: i64, head: &[Option<i32>]) -> ReferenceClassifierSet {
        let mut row = [Some(1); CLASSIFIER_SLOTS];
        row[..head.len()].copy_from_slice(head);
        ReferenceClassifierSet { id, values: row }
    }

    #[test]
    fn test_identical_tuples_share_ids() {
        let mut interner = ClassifierSetInterner::new();
        let tuples = [
            values(&[2, 3]),
            values(&[4, 5]),
            values(&[2, 3]),
            values(&[6]),
            values(&[4, 5]),
            values(&[2, 3]),
        ];

        let ids: Vec<i64> = tuples.iter().map(|t| interner.get_or_assign(t)).collect();

        assert_eq!(ids, vec![1, 2, 1, 3, 2, 1]);
        assert_eq!(interner.len(), 3);
        assert_eq!(interner.assigned_this_session(), 3);
    }

    #[test]
    fn test_distinct_ids_equal_distinct_tuples_for_any_order() {
        let mut interner = ClassifierSetInterner::new();
        let mut seen = HashMap::new();
        for i in 0..200 {
            let tuple = values(&[(i * 7) % 13 + 1, (i * 3) % 5 + 1]);
            let id = interner.get_or_assign(&tuple);
            let previous = seen.insert(tuple.interning_key(), id);
            if let Some(previous) = previous {
                assert_eq!(previous, id);
            }
        }
        let distinct_ids: std::collections::HashSet<i64> = seen.values().copied().collect();
        assert_eq!(distinct_ids.len(), seen.len());
        assert_eq!(interner.len(), seen.len());
    }

    #[test]
    fn test_non_positive_values_fold_to_unclassified() {
        let mut interner = ClassifierSetInterner::new();
        let explicit = interner.get_or_assign(&values(&[5, 1, 1]));
        let zeroed = interner.get_or_assign(&ClassifierValues([5, 0, -99, 1, 1, 1, 1, 1, 1, 1]));
        assert_eq!(explicit, zeroed);
    }

    #[test]
    fn test_seeding_continues_after_max_id() {
        let mut interner = ClassifierSetInterner::new();
        let report = interner.seed(vec![
            reference(10, &[Some(2)]),
            reference(4, &[Some(3)]),
        ]);

        assert_eq!(report.accepted, 2);
        assert_eq!(interner.get(&values(&[2])), Some(10));
        assert_eq!(interner.get_or_assign(&values(&[3])), 4);
        assert_eq!(interner.get_or_assign(&values(&[9])), 11);
        assert_eq!(interner.seeded(), 2);
        assert_eq!(interner.assigned_this_session(), 1);
    }

    #[test]
    fn test_seeding_drops_incomplete_and_duplicate_rows() {
        let mut interner = ClassifierSetInterner::new();
        let report = interner.seed(vec![
            reference(1, &[Some(2)]),
            reference(2, &[Some(2), None]),
            reference(3, &[Some(2)]),
            reference(1, &[Some(7)]),
            reference(4, &[Some(8)]),
        ]);

        assert_eq!(report.accepted, 2);
        assert_eq!(report.missing_values, 1);
        assert_eq!(report.duplicate_tuples, 1);
        assert_eq!(report.duplicate_ids, 1);
        assert_eq!(report.dropped(), 3);
        assert_eq!(interner.get(&values(&[2])), Some(1));
        assert_eq!(interner.get(&values(&[7])), None);
    }

    #[test]
    fn test_to_dataframe_lists_sets_by_id() {
        let mut interner = ClassifierSetInterner::new();
        interner.seed(vec![reference(5, &[Some(3)])]);
        interner.get_or_assign(&values(&[4]));

        let df = interner.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), CLASSIFIER_SLOTS + 1);

        let ids: Vec<i64> = df
            .column(CLASSIFIER_SET_ID_COLUMN)
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(ids, vec![5, 6]);
    }
}
