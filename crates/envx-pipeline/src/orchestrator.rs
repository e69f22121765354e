//! Stage sequencing: read, convert, clean, aggregate, persist

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use envx_archive::TimeBucketAggregator;
use envx_clean::{CleanReport, Cleaner};
use envx_core::{
    annotate_missing_aqi, into_records, Dataset, PeriodType, RangeTable, Sink, Source, TimeRange,
};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::jobs::{Job, Stage};

/// Counts for one finished stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    /// Raw records returned by the source
    pub read: usize,
    pub clean: CleanReport,
    pub hourly_buckets: usize,
    pub daily_buckets: usize,
    /// Rows acknowledged by the sink
    pub written: u64,
}

impl StageReport {
    fn new(stage: Stage, read: usize) -> Self {
        Self {
            stage,
            read,
            clean: CleanReport::default(),
            hourly_buckets: 0,
            daily_buckets: 0,
            written: 0,
        }
    }
}

/// Runs pipeline stages against a source and a sink
pub struct Orchestrator {
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    ranges: HashMap<Dataset, RangeTable>,
    processed_at: Option<DateTime<Utc>>,
}

impl Orchestrator {
    pub fn new(source: Box<dyn Source>, sink: Box<dyn Sink>) -> Self {
        Self {
            source,
            sink,
            ranges: HashMap::new(),
            processed_at: None,
        }
    }

    /// Replace the default range table of the table's dataset
    pub fn with_range_table(mut self, table: RangeTable) -> Self {
        self.ranges.insert(table.dataset(), table);
        self
    }

    /// Stamp every bucket with `at` instead of the wall clock
    pub fn with_processed_at(mut self, at: DateTime<Utc>) -> Self {
        self.processed_at = Some(at);
        self
    }

    fn cleaner(&self, dataset: Dataset) -> Cleaner {
        match self.ranges.get(&dataset) {
            Some(table) => Cleaner::new(table.clone()),
            None => Cleaner::for_dataset(dataset),
        }
    }

    /// Run every stage of `job` in order, stopping at the first failure
    pub async fn run(&mut self, job: Job, ingest_dataset: Dataset, range: &TimeRange) -> Result<Vec<StageReport>> {
        let mut reports = Vec::new();
        for stage in job.stages(ingest_dataset) {
            info!(">>> {}", stage);
            let report = self
                .run_stage(stage, range)
                .await
                .with_context(|| format!("Stage '{}' failed", stage))?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub async fn run_stage(&mut self, stage: Stage, range: &TimeRange) -> Result<StageReport> {
        match stage {
            Stage::Process(dataset) => self.process(dataset, range).await,
            Stage::Aggregate(dataset) => self.aggregate(dataset, range).await,
            Stage::Ingest(dataset) => self.ingest(dataset, range).await,
        }
    }

    /// Read and clean, reporting counts only
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn process(&mut self, dataset: Dataset, range: &TimeRange) -> Result<StageReport> {
        let raw = self.source.read_records(dataset, range).await?;
        let mut report = StageReport::new(Stage::Process(dataset), raw.len());
        info!("Raw {} records: {}", dataset, raw.len());

        let records = into_records(dataset, raw)?;
        let (_, clean) = self.cleaner(dataset).clean(records);
        info!("Cleaned {} records: {}", dataset, clean.output);

        report.clean = clean;
        Ok(report)
    }

    /// Read, clean, bucket hourly and daily, append the union
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn aggregate(&mut self, dataset: Dataset, range: &TimeRange) -> Result<StageReport> {
        let raw = self.source.read_records(dataset, range).await?;
        let mut report = StageReport::new(Stage::Aggregate(dataset), raw.len());
        if raw.is_empty() {
            warn!("No {} data found for {}; skipping aggregation", dataset, range);
            return Ok(report);
        }
        info!("Raw {} records: {}", dataset, raw.len());

        let records = into_records(dataset, raw)?;
        let (records, clean) = self.cleaner(dataset).clean(records);
        report.clean = clean;

        let processed_at = self.processed_at.unwrap_or_else(Utc::now);
        let aggregator = TimeBucketAggregator::new(dataset);
        let buckets = aggregator.aggregate_all(&records, processed_at);
        report.hourly_buckets = buckets
            .iter()
            .filter(|b| b.period_type == PeriodType::Hourly)
            .count();
        report.daily_buckets = buckets.len() - report.hourly_buckets;
        info!("Hourly buckets: {}", report.hourly_buckets);
        info!("Daily buckets: {}", report.daily_buckets);

        report.written = self.sink.write_buckets(dataset, &buckets).await?;
        info!("Wrote {} rows to {}", report.written, dataset.aggregate_table());
        Ok(report)
    }

    /// Read, convert, stamp missing AQI values, append raw rows
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn ingest(&mut self, dataset: Dataset, range: &TimeRange) -> Result<StageReport> {
        let raw = self.source.read_records(dataset, range).await?;
        let mut report = StageReport::new(Stage::Ingest(dataset), raw.len());

        let mut records = into_records(dataset, raw)?;
        if dataset == Dataset::AirQuality {
            let annotated = records
                .iter_mut()
                .map(annotate_missing_aqi)
                .filter(|stamped| *stamped)
                .count();
            info!("Computed AQI for {} records", annotated);
        }

        report.written = self.sink.write_records(dataset, &records).await?;
        info!("Wrote {} rows to {}", report.written, dataset.raw_table());
        Ok(report)
    }
}
