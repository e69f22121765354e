use anyhow::Result;

use crate::{AggregatedBucket, Dataset, MeasurementRecord, RawMeasurement, TimeRange};

/// Reads raw measurement batches from storage
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn read_records(&self, dataset: Dataset, range: &TimeRange) -> Result<Vec<RawMeasurement>>;
}

/// Append-only writer for raw records and aggregated buckets
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn write_records(&mut self, dataset: Dataset, records: &[MeasurementRecord]) -> Result<u64>;

    async fn write_buckets(&mut self, dataset: Dataset, buckets: &[AggregatedBucket]) -> Result<u64>;
}
