//! Database query operations for the measurement tables

use crate::schema::{aggregate_columns, raw_columns, rows_per_insert, stat_columns};
use crate::{DbClient, DbResult};
use envx_core::{
    AggregatedBucket, Dataset, FieldKind, MeasurementRecord, MetricValue, Metrics,
    RawMeasurement, Sink, Source, TimeRange,
};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info, instrument};

impl DbClient {
    /// Read raw rows of `dataset` whose timestamp lies in `range`
    #[instrument(skip(self), fields(table = dataset.raw_table()))]
    pub async fn read_raw(&self, dataset: Dataset, range: &TimeRange) -> DbResult<Vec<RawMeasurement>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {}",
            select_list(dataset),
            dataset.raw_table()
        ));

        let mut keyword = " WHERE ";
        if let Some(start) = range.start {
            query.push(keyword).push("timestamp >= ").push_bind(start);
            keyword = " AND ";
        }
        if let Some(end) = range.end {
            query.push(keyword).push("timestamp < ").push_bind(end);
        }

        let rows = query.build().fetch_all(self.pool()).await?;
        debug!("Retrieved {} rows from {} ({})", rows.len(), dataset.raw_table(), range);

        rows.iter().map(|row| decode_raw(dataset, row)).collect()
    }

    /// Append raw records; returns the number of rows inserted
    #[instrument(skip(self, records), fields(table = dataset.raw_table(), records = records.len()))]
    pub async fn insert_records(&self, dataset: Dataset, records: &[MeasurementRecord]) -> DbResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let columns = raw_columns(dataset);
        let chunk_size = rows_per_insert(columns.len(), self.batch_size());
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(chunk_size) {
            let mut query = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}) ",
                dataset.raw_table(),
                columns.join(", ")
            ));
            query.push_values(chunk, |mut row, record| {
                row.push_bind(record.timestamp)
                    .push_bind(record.location_id.clone());
                for spec in dataset.fields() {
                    let value = record.get(spec.name);
                    match spec.kind {
                        FieldKind::Float => row.push_bind(value.as_f64()),
                        FieldKind::Integer => row.push_bind(value.as_i64()),
                        FieldKind::Text => row.push_bind(value.as_str().map(str::to_string)),
                    };
                }
            });

            inserted += query.build().execute(&mut *tx).await?.rows_affected();
            debug!("Inserted {} rows into {}", chunk.len(), dataset.raw_table());
        }

        tx.commit().await?;
        info!("Appended {} rows to {}", inserted, dataset.raw_table());
        Ok(inserted)
    }

    /// Append aggregated buckets; returns the number of rows inserted
    #[instrument(skip(self, buckets), fields(table = dataset.aggregate_table(), buckets = buckets.len()))]
    pub async fn insert_buckets(&self, dataset: Dataset, buckets: &[AggregatedBucket]) -> DbResult<u64> {
        if buckets.is_empty() {
            return Ok(0);
        }

        let columns = aggregate_columns(dataset);
        let stats = stat_columns(dataset);
        let representative = dataset.representative_field().is_some();
        let chunk_size = rows_per_insert(columns.len(), self.batch_size());
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;

        for chunk in buckets.chunks(chunk_size) {
            let mut query = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}) ",
                dataset.aggregate_table(),
                columns.join(", ")
            ));
            query.push_values(chunk, |mut row, bucket| {
                row.push_bind(bucket.bucket_start)
                    .push_bind(bucket.location_id.clone())
                    .push_bind(bucket.period_type.as_str());
                for stat in &stats {
                    let value = bucket.stat(stat.metric, stat.aggregate);
                    match stat.kind {
                        FieldKind::Integer => row.push_bind(value.and_then(|v| v.as_i64())),
                        _ => row.push_bind(value.and_then(|v| v.as_f64())),
                    };
                }
                row.push_bind(bucket.sample_count);
                if representative {
                    row.push_bind(bucket.dominant_pollutant.clone());
                }
                row.push_bind(bucket.processed_at);
            });

            inserted += query.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        info!("Appended {} rows to {}", inserted, dataset.aggregate_table());
        Ok(inserted)
    }
}

/// Column list with numeric columns cast to the types decoded below
fn select_list(dataset: Dataset) -> String {
    let mut list = vec!["timestamp".to_string(), "location_id".to_string()];
    list.extend(dataset.fields().iter().map(|spec| match spec.kind {
        FieldKind::Float => format!("{0}::double precision AS {0}", spec.name),
        FieldKind::Integer => format!("{0}::bigint AS {0}", spec.name),
        FieldKind::Text => spec.name.to_string(),
    }));
    list.join(", ")
}

fn decode_raw(dataset: Dataset, row: &PgRow) -> DbResult<RawMeasurement> {
    let mut metrics = Metrics::new();
    for spec in dataset.fields() {
        let value: MetricValue = match spec.kind {
            FieldKind::Float => row.try_get::<Option<f64>, _>(spec.name)?.into(),
            FieldKind::Integer => row.try_get::<Option<i64>, _>(spec.name)?.into(),
            FieldKind::Text => row.try_get::<Option<String>, _>(spec.name)?.into(),
        };
        metrics.insert(spec.name.to_string(), value);
    }

    Ok(RawMeasurement {
        timestamp: row.try_get("timestamp")?,
        location_id: row.try_get("location_id")?,
        metrics,
    })
}

#[async_trait::async_trait]
impl Source for DbClient {
    async fn read_records(&self, dataset: Dataset, range: &TimeRange) -> anyhow::Result<Vec<RawMeasurement>> {
        Ok(self.read_raw(dataset, range).await?)
    }
}

#[async_trait::async_trait]
impl Sink for DbClient {
    async fn write_records(&mut self, dataset: Dataset, records: &[MeasurementRecord]) -> anyhow::Result<u64> {
        Ok(self.insert_records(dataset, records).await?)
    }

    async fn write_buckets(&mut self, dataset: Dataset, buckets: &[AggregatedBucket]) -> anyhow::Result<u64> {
        Ok(self.insert_buckets(dataset, buckets).await?)
    }
}
