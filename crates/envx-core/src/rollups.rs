//! Aggregation and rollup calculations for bucket statistics

use crate::datasets::FieldKind;
use crate::types::{AggregateType, MetricStats, MetricValue};

/// Running count/sum/min/max over the non-null values of one metric.
///
/// Accumulators are commutative and associative under [`Accumulator::merge`],
/// so partial results computed on different workers can be combined in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn result(&self, aggregate_type: AggregateType) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        match aggregate_type {
            AggregateType::Avg => Some(self.sum / self.count as f64),
            AggregateType::Min => Some(self.min),
            AggregateType::Max => Some(self.max),
            AggregateType::First => None,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Planned statistics for a field of the given kind.
    ///
    /// Min/max of integer fields stay in the integer domain; averages are
    /// always floating point.
    pub fn to_stats(&self, aggregates: &[AggregateType], kind: FieldKind) -> MetricStats {
        let extremum = |agg: AggregateType| {
            self.result(agg).map(|v| match kind {
                FieldKind::Integer => MetricValue::Integer(v as i64),
                _ => MetricValue::Float(v),
            })
        };

        let mut stats = MetricStats::default();
        for agg in aggregates {
            match agg {
                AggregateType::Avg => stats.avg = self.result(AggregateType::Avg),
                AggregateType::Min => stats.min = extremum(AggregateType::Min),
                AggregateType::Max => stats.max = extremum(AggregateType::Max),
                AggregateType::First => {}
            }
        }
        stats
    }
}
