//! Last-observation-carried-forward imputation

use envx_core::{Dataset, MeasurementRecord, MetricValue};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Fills nulls with the nearest earlier non-null value of the same location.
///
/// Records are partitioned by `location_id` and stably sorted by timestamp,
/// so equal timestamps keep their input order. A null with no earlier value
/// in its partition stays null. Partitions are filled in parallel; within a
/// partition the scan is sequential.
///
/// Output is ordered by location, then timestamp.
#[derive(Debug, Clone)]
pub struct GapFiller {
    fields: Vec<&'static str>,
}

impl GapFiller {
    pub fn new(fields: Vec<&'static str>) -> Self {
        Self { fields }
    }

    /// Fills the ranged fields of `dataset`
    pub fn for_dataset(dataset: Dataset) -> Self {
        Self::new(dataset.valid_ranges().iter().map(|r| r.field).collect())
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    /// Returns the filled records and how many values were carried forward
    pub fn apply(&self, records: Vec<MeasurementRecord>) -> (Vec<MeasurementRecord>, usize) {
        let filled: Vec<(Vec<MeasurementRecord>, usize)> = partition(records)
            .into_par_iter()
            .map(|part| self.fill_partition(part))
            .collect();

        let total = filled.iter().map(|(_, n)| n).sum();
        let records = filled.into_iter().flat_map(|(part, _)| part).collect();
        (records, total)
    }

    fn fill_partition(&self, mut part: Vec<MeasurementRecord>) -> (Vec<MeasurementRecord>, usize) {
        // sort_by_key is stable
        part.sort_by_key(|r| r.timestamp);

        let mut last: Vec<Option<MetricValue>> = vec![None; self.fields.len()];
        let mut filled = 0;

        for record in &mut part {
            for (slot, field) in last.iter_mut().zip(&self.fields) {
                match record.metrics.get(*field) {
                    Some(value) if !value.is_null() => *slot = Some(value.clone()),
                    _ => {
                        if let Some(previous) = slot {
                            record.set(field, previous.clone());
                            filled += 1;
                        }
                    }
                }
            }
        }

        (part, filled)
    }
}

fn partition(records: Vec<MeasurementRecord>) -> Vec<Vec<MeasurementRecord>> {
    let mut by_location: BTreeMap<String, Vec<MeasurementRecord>> = BTreeMap::new();
    for record in records {
        by_location
            .entry(record.location_id.clone())
            .or_default()
            .push(record);
    }
    by_location.into_values().collect()
}
