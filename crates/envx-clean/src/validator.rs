//! Physical range validation

use envx_core::{Dataset, FieldKind, MeasurementRecord, MetricValue, RangeTable, ValidRange};

/// Replaces values outside a field's closed `[lo, hi]` interval with null.
///
/// Non-numeric and NaN values in a ranged field count as out of range, as do
/// fractional values of integer fields. Integral floats in an integer field
/// are stored as integers. Records are never dropped.
#[derive(Debug, Clone)]
pub struct RangeValidator {
    table: RangeTable,
}

impl RangeValidator {
    pub fn new(table: RangeTable) -> Self {
        Self { table }
    }

    pub fn for_dataset(dataset: Dataset) -> Self {
        Self::new(RangeTable::for_dataset(dataset))
    }

    pub fn table(&self) -> &RangeTable {
        &self.table
    }

    /// Validate every record in place, returning how many values were nulled
    pub fn apply(&self, records: &mut [MeasurementRecord]) -> usize {
        records.iter_mut().map(|r| self.validate_record(r)).sum()
    }

    pub fn validate_record(&self, record: &mut MeasurementRecord) -> usize {
        let dataset = self.table.dataset();
        let mut nulled = 0;
        for range in self.table.iter() {
            let kind = dataset.field(range.field).map_or(FieldKind::Float, |f| f.kind);
            if let Some(value) = record.metrics.get_mut(range.field) {
                if !is_valid(range, kind, value) {
                    *value = MetricValue::Null;
                    nulled += 1;
                } else if let (FieldKind::Integer, MetricValue::Float(v)) = (kind, &*value) {
                    *value = MetricValue::Integer(*v as i64);
                }
            }
        }
        nulled
    }
}

fn is_valid(range: &ValidRange, kind: FieldKind, value: &MetricValue) -> bool {
    value.is_null()
        || value
            .as_f64()
            .is_some_and(|v| range.contains(v) && (kind != FieldKind::Integer || v.fract() == 0.0))
}
