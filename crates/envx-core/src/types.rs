//! Core data types for measurements and aggregated buckets

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{CoreError, CoreResult, Dataset};

/// Metric values keyed by field name
pub type Metrics = BTreeMap<String, MetricValue>;

static NULL: MetricValue = MetricValue::Null;

/// A metric value with null handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            MetricValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Integer(v) => Some(*v),
            MetricValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(MetricValue::Null, Into::into)
    }
}

/// Record as delivered by a reader, before the shape check
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawMeasurement {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub location_id: Option<String>,

    #[serde(flatten)]
    pub metrics: Metrics,
}

impl RawMeasurement {
    /// Check the required keys and normalise the field set to `dataset`.
    ///
    /// Dataset fields absent from the raw record are inserted as null.
    /// `index` only feeds the error message.
    pub fn into_record(self, index: usize, dataset: Dataset) -> CoreResult<MeasurementRecord> {
        let timestamp = self.timestamp.ok_or(CoreError::MissingField {
            index,
            field: "timestamp",
        })?;
        let location_id = self
            .location_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(CoreError::MissingField {
                index,
                field: "location_id",
            })?;

        let mut metrics = self.metrics;
        for spec in dataset.fields() {
            metrics
                .entry(spec.name.to_string())
                .or_insert(MetricValue::Null);
        }

        Ok(MeasurementRecord {
            timestamp,
            location_id,
            metrics,
        })
    }
}

/// Convert a whole raw batch. The first malformed record fails the batch.
pub fn into_records(dataset: Dataset, raw: Vec<RawMeasurement>) -> CoreResult<Vec<MeasurementRecord>> {
    raw.into_iter()
        .enumerate()
        .map(|(index, r)| r.into_record(index, dataset))
        .collect()
}

/// One timestamped observation set for one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,

    pub location_id: String,

    /// Field name -> value
    #[serde(flatten)]
    pub metrics: Metrics,
}

impl MeasurementRecord {
    pub fn new(timestamp: DateTime<Utc>, location_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            location_id: location_id.into(),
            metrics: Metrics::new(),
        }
    }

    /// Builder-style setter, mostly for fixtures
    pub fn with(mut self, field: &str, value: impl Into<MetricValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Value of `field`, null when the field is absent
    pub fn get(&self, field: &str) -> &MetricValue {
        self.metrics.get(field).unwrap_or(&NULL)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).as_f64()
    }

    pub fn set(&mut self, field: &str, value: impl Into<MetricValue>) {
        self.metrics.insert(field.to_string(), value.into());
    }
}

/// Aggregation applied to a metric inside a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Avg,
    Min,
    Max,
    /// Value of the first record observed in the group
    First,
}

impl AggregateType {
    /// Column prefix used by the aggregated tables
    pub fn prefix(&self) -> &'static str {
        match self {
            AggregateType::Avg => "avg",
            AggregateType::Min => "min",
            AggregateType::Max => "max",
            AggregateType::First => "first",
        }
    }
}

/// Bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hourly,
    Daily,
}

impl PeriodType {
    pub const ALL: [PeriodType; 2] = [PeriodType::Hourly, PeriodType::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
        }
    }

    /// Start of the bucket containing `timestamp` (UTC)
    pub fn truncate(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = timestamp.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            PeriodType::Hourly => midnight + chrono::Duration::hours(i64::from(timestamp.hour())),
            PeriodType::Daily => midnight,
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional half-open `[start, end)` filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Range from calendar dates, each taken at UTC midnight
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let midnight = |d: NaiveDate| d.and_time(chrono::NaiveTime::MIN).and_utc();
        Self {
            start: start.map(midnight),
            end: end.map(midnight),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp < e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |t: Option<DateTime<Utc>>| t.map_or_else(|| "all".to_string(), |t| t.to_rfc3339());
        write!(f, "{} -> {}", show(self.start), show(self.end))
    }
}

/// Summary statistics of one metric inside a bucket.
///
/// Only the statistics the dataset plans for the metric are filled; a metric
/// whose values are all null in the group has every statistic unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<MetricValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<MetricValue>,
}

impl MetricStats {
    pub fn get(&self, aggregate: AggregateType) -> Option<MetricValue> {
        match aggregate {
            AggregateType::Avg => self.avg.map(MetricValue::Float),
            AggregateType::Min => self.min.clone(),
            AggregateType::Max => self.max.clone(),
            AggregateType::First => None,
        }
    }
}

/// Fixed-window rollup for one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedBucket {
    /// Hour- or day-truncated start of the window
    pub bucket_start: DateTime<Utc>,

    pub location_id: String,

    pub period_type: PeriodType,

    pub stats: BTreeMap<String, MetricStats>,

    /// Number of cleaned records in the group
    pub sample_count: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_pollutant: Option<String>,

    pub processed_at: DateTime<Utc>,
}

impl AggregatedBucket {
    pub fn stat(&self, metric: &str, aggregate: AggregateType) -> Option<MetricValue> {
        self.stats.get(metric).and_then(|s| s.get(aggregate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 17).unwrap()
    }

    #[test]
    fn test_metric_value_conversions() {
        let float_val = MetricValue::Float(25.5);
        assert_eq!(float_val.as_f64(), Some(25.5));

        let int_val = MetricValue::Integer(42);
        assert_eq!(int_val.as_i64(), Some(42));
        assert_eq!(int_val.as_f64(), Some(42.0));

        let text_val = MetricValue::Text("pm25".into());
        assert_eq!(text_val.as_f64(), None);
        assert_eq!(text_val.as_str(), Some("pm25"));

        assert!(MetricValue::Null.is_null());
        assert_eq!(MetricValue::from(None::<f64>), MetricValue::Null);
    }

    #[test]
    fn test_raw_measurement_serde() {
        let json = r#"{"timestamp":"2024-03-10T04:05:17Z","location_id":"nyc","pm25":12.5,"aqi":52,"dominant_pollutant":"pm25","co":null}"#;
        let raw: RawMeasurement = serde_json::from_str(json).unwrap();

        assert_eq!(raw.timestamp, Some(ts(4, 5)));
        assert_eq!(raw.location_id.as_deref(), Some("nyc"));
        assert_eq!(raw.metrics["pm25"], MetricValue::Float(12.5));
        assert_eq!(raw.metrics["aqi"], MetricValue::Integer(52));
        assert_eq!(raw.metrics["co"], MetricValue::Null);
    }

    #[test]
    fn test_into_record_fills_missing_fields() {
        let raw = RawMeasurement {
            timestamp: Some(ts(1, 0)),
            location_id: Some("berlin".into()),
            metrics: Metrics::from([("temperature".to_string(), MetricValue::Float(3.5))]),
        };

        let record = raw.into_record(0, Dataset::Weather).unwrap();
        assert_eq!(record.get_f64("temperature"), Some(3.5));
        assert!(record.metrics.contains_key("wind_speed"));
        assert!(record.get("wind_speed").is_null());
    }

    #[test]
    fn test_missing_key_fails_batch() {
        let good = RawMeasurement {
            timestamp: Some(ts(1, 0)),
            location_id: Some("a".into()),
            ..Default::default()
        };
        let no_location = RawMeasurement {
            timestamp: Some(ts(2, 0)),
            location_id: Some("  ".into()),
            ..Default::default()
        };
        let no_time = RawMeasurement {
            location_id: Some("a".into()),
            ..Default::default()
        };

        let err = into_records(Dataset::Weather, vec![good.clone(), no_location]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingField { index: 1, field: "location_id" }
        ));

        let err = into_records(Dataset::Weather, vec![no_time, good]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingField { index: 0, field: "timestamp" }
        ));
    }

    #[test]
    fn test_empty_batch_is_ok() {
        assert!(into_records(Dataset::AirQuality, vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_period_truncation() {
        let t = ts(13, 47);
        assert_eq!(
            PeriodType::Hourly.truncate(t),
            Utc.with_ymd_and_hms(2024, 3, 10, 13, 0, 0).unwrap()
        );
        assert_eq!(
            PeriodType::Daily.truncate(t),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_truncation_far_from_epoch() {
        let late = Utc.with_ymd_and_hms(2400, 2, 29, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(1500, 7, 1, 5, 30, 0).unwrap();

        assert_eq!(
            PeriodType::Hourly.truncate(late),
            Utc.with_ymd_and_hms(2400, 2, 29, 23, 0, 0).unwrap()
        );
        assert_eq!(
            PeriodType::Daily.truncate(early),
            Utc.with_ymd_and_hms(1500, 7, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_time_range_is_half_open() {
        let range = TimeRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 3, 10),
            NaiveDate::from_ymd_opt(2024, 3, 11),
        );

        assert!(range.contains(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()));
        assert!(TimeRange::default().contains(ts(0, 0)));
        assert!(TimeRange::default().is_unbounded());
    }
}
