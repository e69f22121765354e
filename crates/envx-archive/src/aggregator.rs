//! Fixed-window aggregation logic

use crate::{BucketKey, GroupAccumulator};
use chrono::{DateTime, Utc};
use envx_core::{AggregatedBucket, Dataset, MeasurementRecord, PeriodType};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

type Groups = HashMap<BucketKey, GroupAccumulator>;

/// Reduces cleaned records of one dataset to per-location window buckets
#[derive(Debug, Clone, Copy)]
pub struct TimeBucketAggregator {
    dataset: Dataset,
}

impl TimeBucketAggregator {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    /// One bucket per non-empty `(window start, location)` group, ordered by
    /// window start then location.
    ///
    /// Groups are reduced in parallel. Partial results only ever merge
    /// through [`GroupAccumulator::merge`], so keys, counts, extrema and
    /// representatives do not depend on how rayon splits the input. Float
    /// sums are added in split order, so `avg` of non-integral data may
    /// differ in the last bit between runs.
    #[instrument(skip(self, records, processed_at), fields(dataset = %self.dataset, records = records.len()))]
    pub fn aggregate(
        &self,
        records: &[MeasurementRecord],
        period: PeriodType,
        processed_at: DateTime<Utc>,
    ) -> Vec<AggregatedBucket> {
        if records.is_empty() {
            debug!("No records to aggregate");
            return Vec::new();
        }

        let plans = self.dataset.metric_plans();
        let representative = self.dataset.representative_field();

        let groups = records
            .par_iter()
            .enumerate()
            .fold(Groups::new, |mut groups, (index, record)| {
                let key = BucketKey::new(period.truncate(record.timestamp), record.location_id.clone());
                groups
                    .entry(key)
                    .or_insert_with(|| GroupAccumulator::new(plans))
                    .add(index, record, plans, representative);
                groups
            })
            .reduce(Groups::new, merge_groups);

        let mut buckets: Vec<AggregatedBucket> = groups
            .into_iter()
            .map(|(key, acc)| acc.finish(key, self.dataset, period, processed_at))
            .collect();
        buckets.sort_by(|a, b| {
            (a.bucket_start, &a.location_id).cmp(&(b.bucket_start, &b.location_id))
        });

        info!("Aggregated {} records into {} {} buckets", records.len(), buckets.len(), period);
        buckets
    }

    /// Hourly buckets followed by daily buckets over the same records
    pub fn aggregate_all(
        &self,
        records: &[MeasurementRecord],
        processed_at: DateTime<Utc>,
    ) -> Vec<AggregatedBucket> {
        PeriodType::ALL
            .into_iter()
            .flat_map(|period| self.aggregate(records, period, processed_at))
            .collect()
    }
}

fn merge_groups(mut left: Groups, right: Groups) -> Groups {
    for (key, acc) in right {
        match left.get_mut(&key) {
            Some(existing) => existing.merge(acc),
            None => {
                left.insert(key, acc);
            }
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use envx_core::{AggregateType, MetricValue};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 5, hour, minute, 0).unwrap()
    }

    fn processed() -> DateTime<Utc> {
        at(12, 0)
    }

    fn weather(hour: u32, minute: u32, location: &str, temp: Option<f64>) -> MeasurementRecord {
        MeasurementRecord::new(at(hour, minute), location).with("temperature", temp)
    }

    fn temp(bucket: &AggregatedBucket, agg: AggregateType) -> Option<f64> {
        bucket.stat("temperature", agg).and_then(|v| v.as_f64())
    }

    #[test]
    fn test_single_record_bucket() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let buckets = aggregator
            .aggregate(&[weather(10, 17, "paris", Some(21.5))], PeriodType::Hourly, processed());

        assert_eq!(buckets.len(), 1);
        let b = &buckets[0];
        assert_eq!(b.bucket_start, at(10, 0));
        assert_eq!(b.sample_count, 1);
        assert_eq!(temp(b, AggregateType::Avg), Some(21.5));
        assert_eq!(temp(b, AggregateType::Min), Some(21.5));
        assert_eq!(temp(b, AggregateType::Max), Some(21.5));
        assert_eq!(b.processed_at, processed());
    }

    #[test]
    fn test_bucket_json_shape() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records = [
            MeasurementRecord::new(at(10, 5), "paris")
                .with("temperature", 10.0)
                .with("humidity", 50.0)
                .with("pressure", 1000.0)
                .with("wind_speed", 2.0),
            MeasurementRecord::new(at(10, 35), "paris")
                .with("temperature", 14.0)
                .with("humidity", 60.0)
                .with("pressure", 1010.0)
                .with("wind_speed", 4.0),
        ];

        let buckets = aggregator
            .aggregate(&records, PeriodType::Hourly, processed());
        insta::assert_snapshot!(
            serde_json::to_string(&buckets[0]).unwrap(),
            @r#"{"bucket_start":"2024-05-05T10:00:00Z","location_id":"paris","period_type":"hourly","stats":{"humidity":{"avg":55.0,"min":50.0,"max":60.0},"pressure":{"avg":1005.0,"max":1010.0},"temperature":{"avg":12.0,"min":10.0,"max":14.0},"wind_speed":{"avg":3.0,"max":4.0}},"sample_count":2,"processed_at":"2024-05-05T12:00:00Z"}"#
        );
    }

    #[test]
    fn test_hourly_and_daily_grouping() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records = [
            weather(9, 0, "oslo", Some(1.0)),
            weather(9, 59, "oslo", Some(3.0)),
            weather(10, 0, "oslo", Some(5.0)),
            weather(23, 30, "oslo", Some(7.0)),
            weather(9, 30, "rome", Some(20.0)),
        ];

        let hourly = aggregator.aggregate(&records, PeriodType::Hourly, processed());
        let keys: Vec<_> = hourly
            .iter()
            .map(|b| (b.bucket_start, b.location_id.as_str(), b.sample_count))
            .collect();
        assert_eq!(
            keys,
            [
                (at(9, 0), "oslo", 2),
                (at(9, 0), "rome", 1),
                (at(10, 0), "oslo", 1),
                (at(23, 0), "oslo", 1),
            ]
        );
        assert_eq!(temp(&hourly[0], AggregateType::Avg), Some(2.0));

        let daily = aggregator.aggregate(&records, PeriodType::Daily, processed());
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].bucket_start, at(0, 0));
        assert_eq!(daily[0].location_id, "oslo");
        assert_eq!(daily[0].sample_count, 4);
        assert_eq!(temp(&daily[0], AggregateType::Avg), Some(4.0));
        assert_eq!(temp(&daily[0], AggregateType::Min), Some(1.0));
        assert_eq!(temp(&daily[0], AggregateType::Max), Some(7.0));
        assert!(daily.iter().all(|b| b.period_type == PeriodType::Daily));
    }

    #[test]
    fn test_aggregate_all_is_hourly_then_daily() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records = [weather(9, 0, "oslo", Some(1.0)), weather(15, 0, "oslo", Some(3.0))];

        let all = aggregator.aggregate_all(&records, processed());
        let periods: Vec<_> = all.iter().map(|b| b.period_type).collect();
        assert_eq!(periods, [PeriodType::Hourly, PeriodType::Hourly, PeriodType::Daily]);
    }

    #[test]
    fn test_only_planned_statistics_are_emitted() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records = [MeasurementRecord::new(at(3, 0), "x")
            .with("pressure", 1001.0)
            .with("wind_speed", 3.0)];

        let b = &aggregator.aggregate(&records, PeriodType::Hourly, processed())[0];
        assert_eq!(
            b.stat("pressure", AggregateType::Avg),
            Some(MetricValue::Float(1001.0))
        );
        assert_eq!(b.stat("pressure", AggregateType::Max), Some(MetricValue::Float(1001.0)));
        assert_eq!(b.stat("pressure", AggregateType::Min), None);
        assert_eq!(b.stat("wind_speed", AggregateType::Min), None);
        assert_eq!(b.dominant_pollutant, None);
    }

    #[test]
    fn test_all_null_metric_counts_samples() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records = [weather(3, 0, "x", None), weather(3, 10, "x", None)];

        let b = &aggregator.aggregate(&records, PeriodType::Hourly, processed())[0];
        assert_eq!(b.sample_count, 2);
        assert_eq!(temp(b, AggregateType::Avg), None);
        assert_eq!(temp(b, AggregateType::Min), None);
        assert_eq!(temp(b, AggregateType::Max), None);
    }

    #[test]
    fn test_nulls_are_ignored_in_statistics() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records = [
            weather(3, 0, "x", Some(4.0)),
            weather(3, 10, "x", None),
            weather(3, 20, "x", Some(8.0)),
        ];

        let b = &aggregator.aggregate(&records, PeriodType::Hourly, processed())[0];
        assert_eq!(b.sample_count, 3);
        assert_eq!(temp(b, AggregateType::Avg), Some(6.0));
    }

    #[test]
    fn test_integer_aqi_extremes() {
        let aggregator = TimeBucketAggregator::new(Dataset::AirQuality);
        let records = [
            MeasurementRecord::new(at(6, 0), "delhi").with("aqi", 151_i64),
            MeasurementRecord::new(at(6, 30), "delhi").with("aqi", 180_i64),
        ];

        let b = &aggregator.aggregate(&records, PeriodType::Hourly, processed())[0];
        assert_eq!(b.stat("aqi", AggregateType::Min), Some(MetricValue::Integer(151)));
        assert_eq!(b.stat("aqi", AggregateType::Max), Some(MetricValue::Integer(180)));
        assert_eq!(b.stat("aqi", AggregateType::Avg), Some(MetricValue::Float(165.5)));
        assert_eq!(b.stat("co", AggregateType::Max), None);
    }

    #[test]
    fn test_dominant_pollutant_is_first_observed() {
        let aggregator = TimeBucketAggregator::new(Dataset::AirQuality);
        let records = [
            MeasurementRecord::new(at(6, 40), "delhi")
                .with("o3", 60.0)
                .with("pm25", 5.0)
                .with("dominant_pollutant", "o3"),
            // Earlier timestamp and higher AQI, but seen second
            MeasurementRecord::new(at(6, 10), "delhi")
                .with("pm25", 150.0)
                .with("o3", 20.0)
                .with("dominant_pollutant", "pm25"),
        ];

        let b = &aggregator.aggregate(&records, PeriodType::Hourly, processed())[0];
        assert_eq!(b.dominant_pollutant.as_deref(), Some("o3"));
    }

    #[test]
    fn test_null_first_dominant_stays_null() {
        let aggregator = TimeBucketAggregator::new(Dataset::AirQuality);
        let records = [
            MeasurementRecord::new(at(6, 0), "delhi").with("dominant_pollutant", MetricValue::Null),
            MeasurementRecord::new(at(6, 5), "delhi").with("dominant_pollutant", "pm10"),
        ];

        let b = &aggregator.aggregate(&records, PeriodType::Hourly, processed())[0];
        assert_eq!(b.dominant_pollutant, None);
    }

    #[test]
    fn test_empty_input() {
        let aggregator = TimeBucketAggregator::new(Dataset::AirQuality);
        assert!(aggregator
            .aggregate(&[], PeriodType::Daily, processed())
            .is_empty());
        assert!(aggregator.aggregate_all(&[], processed()).is_empty());
    }

    #[test]
    fn test_large_batch_matches_sequential_sum() {
        let aggregator = TimeBucketAggregator::new(Dataset::Weather);
        let records: Vec<_> = (0..2000)
            .map(|i| weather((i % 24) as u32, (i % 60) as u32, "grid", Some((i % 50) as f64)))
            .collect();

        let daily = aggregator.aggregate(&records, PeriodType::Daily, processed());
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].sample_count, 2000);
        assert_eq!(temp(&daily[0], AggregateType::Min), Some(0.0));
        assert_eq!(temp(&daily[0], AggregateType::Max), Some(49.0));
        // Sum of 0..50 is 1225, repeated 40 times, integer-valued so exact
        assert_eq!(temp(&daily[0], AggregateType::Avg), Some(24.5));
    }
}
