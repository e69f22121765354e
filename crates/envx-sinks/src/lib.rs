use anyhow::{Context, Result};
use envx_core::{AggregatedBucket, Dataset, MeasurementRecord, Sink};
use serde_json::{Map, Value};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Appends rows as JSON lines to `<dir>/<table>.jsonl`, one file per table
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.jsonl"))
    }

    fn append<T>(&self, table: &str, rows: impl IntoIterator<Item = T>) -> Result<u64>
    where
        T: serde::Serialize,
    {
        let path = self.path_for(table);
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut out = BufWriter::new(file);

        let mut written = 0;
        for row in rows {
            serde_json::to_writer(&mut out, &row)?;
            out.write_all(b"\n")?;
            written += 1;
        }
        out.flush()?;

        debug!("Appended {} lines to {}", written, path.display());
        Ok(written)
    }
}

/// Flat row keyed by aggregated-table column names
pub fn bucket_row(dataset: Dataset, bucket: &AggregatedBucket) -> Value {
    let mut row = Map::new();
    row.insert("bucket".into(), Value::String(bucket.bucket_start.to_rfc3339()));
    row.insert("location_id".into(), Value::String(bucket.location_id.clone()));
    row.insert("period_type".into(), Value::String(bucket.period_type.as_str().into()));
    for (column, metric, aggregate) in dataset.stat_columns() {
        let value = bucket
            .stat(metric, aggregate)
            .map_or(Value::Null, |v| serde_json::to_value(v).unwrap_or(Value::Null));
        row.insert(column, value);
    }
    row.insert("sample_count".into(), Value::from(bucket.sample_count));
    if let Some(field) = dataset.representative_field() {
        let value = bucket.dominant_pollutant.clone().map_or(Value::Null, Value::String);
        row.insert(field.into(), value);
    }
    row.insert("processed_at".into(), Value::String(bucket.processed_at.to_rfc3339()));
    Value::Object(row)
}

#[async_trait::async_trait]
impl Sink for FsSink {
    async fn write_records(&mut self, dataset: Dataset, records: &[MeasurementRecord]) -> Result<u64> {
        self.append(dataset.raw_table(), records)
    }

    async fn write_buckets(&mut self, dataset: Dataset, buckets: &[AggregatedBucket]) -> Result<u64> {
        self.append(
            dataset.aggregate_table(),
            buckets.iter().map(|b| bucket_row(dataset, b)),
        )
    }
}
