//! Exact-key de-duplication

use chrono::{DateTime, Utc};
use envx_core::MeasurementRecord;
use std::collections::HashSet;

/// Collapses records sharing `(timestamp, location_id)`.
///
/// The first record seen in input order survives; later duplicates are
/// dropped whatever their metric values. Surviving records keep their
/// relative order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator;

impl Deduplicator {
    /// Returns the number of records removed
    pub fn apply(&self, records: &mut Vec<MeasurementRecord>) -> usize {
        let before = records.len();
        let mut seen: HashSet<(DateTime<Utc>, String)> = HashSet::with_capacity(before);
        records.retain(|r| seen.insert((r.timestamp, r.location_id.clone())));
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(minute: u32, location: &str, pm25: f64) -> MeasurementRecord {
        let ts = Utc.with_ymd_and_hms(2024, 2, 2, 8, minute, 0).unwrap();
        MeasurementRecord::new(ts, location).with("pm25", pm25)
    }

    #[test]
    fn test_first_seen_survives() {
        let mut records = vec![
            record(0, "a", 1.0),
            record(0, "a", 2.0),
            record(0, "b", 3.0),
            record(5, "a", 4.0),
            record(0, "a", 5.0),
        ];

        assert_eq!(Deduplicator.apply(&mut records), 2);
        let kept: Vec<_> = records.iter().filter_map(|r| r.get_f64("pm25")).collect();
        assert_eq!(kept, [1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut records = vec![record(0, "a", 1.0), record(0, "a", 1.0), record(1, "a", 1.0)];

        assert_eq!(Deduplicator.apply(&mut records), 1);
        let once = records.clone();
        assert_eq!(Deduplicator.apply(&mut records), 0);
        assert_eq!(records, once);
    }
}
