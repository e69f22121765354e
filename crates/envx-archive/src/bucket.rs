//! Per-group accumulation state

use chrono::{DateTime, Utc};
use envx_core::{
    Accumulator, AggregatedBucket, Dataset, FieldKind, MeasurementRecord, MetricPlan, PeriodType,
};
use std::collections::BTreeMap;

/// Grouping key: truncated bucket start plus location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub bucket_start: DateTime<Utc>,
    pub location_id: String,
}

impl BucketKey {
    pub fn new(bucket_start: DateTime<Utc>, location_id: impl Into<String>) -> Self {
        Self {
            bucket_start,
            location_id: location_id.into(),
        }
    }
}

/// Partial reduction of one group; mergeable in any order
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    metrics: Vec<Accumulator>,
    sample_count: i64,
    /// Input position and representative value of the earliest record seen
    first: Option<(usize, Option<String>)>,
}

impl GroupAccumulator {
    pub fn new(plans: &[MetricPlan]) -> Self {
        Self {
            metrics: vec![Accumulator::new(); plans.len()],
            sample_count: 0,
            first: None,
        }
    }

    /// Add the record found at input position `index`
    pub fn add(
        &mut self,
        index: usize,
        record: &MeasurementRecord,
        plans: &[MetricPlan],
        representative: Option<&str>,
    ) {
        self.sample_count += 1;
        for (acc, plan) in self.metrics.iter_mut().zip(plans) {
            if let Some(v) = record.get_f64(plan.field) {
                acc.add(v);
            }
        }

        if self.first.as_ref().map_or(true, |(seen, _)| index < *seen) {
            let value = representative.and_then(|f| record.get(f).as_str().map(str::to_string));
            self.first = Some((index, value));
        }
    }

    pub fn merge(&mut self, other: GroupAccumulator) {
        self.sample_count += other.sample_count;
        for (acc, o) in self.metrics.iter_mut().zip(&other.metrics) {
            acc.merge(o);
        }
        match (&self.first, other.first) {
            (Some((mine, _)), Some(theirs)) if theirs.0 < *mine => self.first = Some(theirs),
            (None, theirs) => self.first = theirs,
            _ => {}
        }
    }

    pub fn sample_count(&self) -> i64 {
        self.sample_count
    }

    pub fn finish(
        self,
        key: BucketKey,
        dataset: Dataset,
        period_type: PeriodType,
        processed_at: DateTime<Utc>,
    ) -> AggregatedBucket {
        let plans = dataset.metric_plans();
        let stats: BTreeMap<_, _> = plans
            .iter()
            .zip(&self.metrics)
            .map(|(plan, acc)| {
                let kind = dataset.field(plan.field).map_or(FieldKind::Float, |f| f.kind);
                (plan.field.to_string(), acc.to_stats(plan.aggregates, kind))
            })
            .collect();

        AggregatedBucket {
            bucket_start: key.bucket_start,
            location_id: key.location_id,
            period_type,
            stats,
            sample_count: self.sample_count,
            dominant_pollutant: self.first.and_then(|(_, value)| value),
            processed_at,
        }
    }
}
