//! Column layout of the measurement tables
//!
//! Column names must stay in line with the deployed tables. Raw tables hold
//! `timestamp`, `location_id` and the dataset fields; aggregated tables hold
//! one `<stat>_<metric>` column per planned statistic, except the ones listed
//! in [`unstored_stats`].

use envx_core::{AggregateType, Dataset, FieldKind};

/// PostgreSQL limit on bind parameters per statement
pub const PG_BIND_LIMIT: usize = 65_535;

/// Bucket columns that precede the statistics
pub const BUCKET_KEY_COLUMNS: [&str; 3] = ["bucket", "location_id", "period_type"];

/// Columns of the raw table, in insert order
pub fn raw_columns(dataset: Dataset) -> Vec<&'static str> {
    let mut columns = vec!["timestamp", "location_id"];
    columns.extend(dataset.fields().iter().map(|f| f.name));
    columns
}

/// One planned statistic and the column storing it
#[derive(Debug, Clone, PartialEq)]
pub struct StatColumn {
    pub column: String,
    pub metric: &'static str,
    pub aggregate: AggregateType,
    pub kind: FieldKind,
}

/// Statistics computed per bucket that the deployed aggregated table has no column for
pub fn unstored_stats(dataset: Dataset) -> &'static [&'static str] {
    match dataset {
        Dataset::Weather => &["max_pressure"],
        Dataset::AirQuality => &[],
    }
}

/// Stored statistics of the aggregated table, in insert order
pub fn stat_columns(dataset: Dataset) -> Vec<StatColumn> {
    let unstored = unstored_stats(dataset);
    dataset
        .stat_columns()
        .into_iter()
        .filter(|(column, _, _)| !unstored.contains(&column.as_str()))
        .map(|(column, metric, aggregate)| {
            // Averages are always fractional
            let kind = match aggregate {
                AggregateType::Avg => FieldKind::Float,
                _ => dataset.field(metric).map_or(FieldKind::Float, |f| f.kind),
            };
            StatColumn {
                column,
                metric,
                aggregate,
                kind,
            }
        })
        .collect()
}

/// Columns of the aggregated table, in insert order
pub fn aggregate_columns(dataset: Dataset) -> Vec<String> {
    let mut columns: Vec<String> = BUCKET_KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(stat_columns(dataset).into_iter().map(|s| s.column));
    columns.push("sample_count".to_string());
    if let Some(field) = dataset.representative_field() {
        columns.push(field.to_string());
    }
    columns.push("processed_at".to_string());
    columns
}

/// Rows per INSERT given the column count and the configured batch size
pub fn rows_per_insert(column_count: usize, batch_size: usize) -> usize {
    (PG_BIND_LIMIT / column_count.max(1)).min(batch_size).max(1)
}
