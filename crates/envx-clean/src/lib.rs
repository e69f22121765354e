//! Measurement cleaning stages
//!
//! Range validation, de-duplication and carry-forward gap filling, applied in
//! that order. None of the stages fail: out-of-range values, duplicates and
//! missing history are data outcomes, not errors.

pub mod dedup;
pub mod gapfill;
pub mod validator;

pub use dedup::*;
pub use gapfill::*;
pub use validator::*;

use envx_core::{Dataset, MeasurementRecord, RangeTable};
use tracing::{debug, info, instrument};

/// Counts collected while cleaning one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub input: usize,
    /// Values replaced by null for being out of range
    pub nulled: usize,
    pub duplicates: usize,
    /// Nulls replaced by a carried-forward value
    pub filled: usize,
    pub output: usize,
}

/// Validator -> Deduplicator -> GapFiller for one dataset
#[derive(Debug, Clone)]
pub struct Cleaner {
    validator: RangeValidator,
    deduplicator: Deduplicator,
    gap_filler: GapFiller,
}

impl Cleaner {
    pub fn for_dataset(dataset: Dataset) -> Self {
        Self::new(RangeTable::for_dataset(dataset))
    }

    /// Cleaner over a (possibly overridden) range table; the range fields are
    /// also the ones gap-filled
    pub fn new(table: RangeTable) -> Self {
        let gap_filler = GapFiller::new(table.fields());
        Self {
            validator: RangeValidator::new(table),
            deduplicator: Deduplicator,
            gap_filler,
        }
    }

    pub fn dataset(&self) -> Dataset {
        self.validator.table().dataset()
    }

    #[instrument(skip_all, fields(dataset = %self.dataset(), input = records.len()))]
    pub fn clean(&self, mut records: Vec<MeasurementRecord>) -> (Vec<MeasurementRecord>, CleanReport) {
        let input = records.len();

        let nulled = self.validator.apply(&mut records);
        debug!("Range validation nulled {} values", nulled);

        let duplicates = self.deduplicator.apply(&mut records);
        debug!("Dropped {} duplicate records", duplicates);

        let (records, filled) = self.gap_filler.apply(records);
        debug!("Carried forward {} values", filled);

        let report = CleanReport {
            input,
            nulled,
            duplicates,
            filled,
            output: records.len(),
        };
        info!(
            "Cleaned {} -> {} records ({} nulled, {} duplicates, {} filled)",
            report.input, report.output, report.nulled, report.duplicates, report.filled
        );
        (records, report)
    }
}
