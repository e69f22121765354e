//! Fixed per-dataset constants: field sets, physical ranges and rollup plans

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::AggregateType;
use crate::{CoreError, CoreResult};

/// Logical dataset; all records of one dataset share its field set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dataset {
    Weather,
    AirQuality,
}

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Float,
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Closed physical interval `[lo, hi]` for one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    pub field: &'static str,
    pub lo: f64,
    pub hi: f64,
}

impl ValidRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }
}

/// Which aggregates a bucket carries for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricPlan {
    pub field: &'static str,
    pub aggregates: &'static [AggregateType],
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

const fn range(field: &'static str, lo: f64, hi: f64) -> ValidRange {
    ValidRange { field, lo, hi }
}

const AVG_MIN_MAX: &[AggregateType] = &[AggregateType::Avg, AggregateType::Min, AggregateType::Max];
const AVG_MAX: &[AggregateType] = &[AggregateType::Avg, AggregateType::Max];
const AVG: &[AggregateType] = &[AggregateType::Avg];

const WEATHER_FIELDS: &[FieldSpec] = &[
    field("temperature", FieldKind::Float),
    field("humidity", FieldKind::Float),
    field("pressure", FieldKind::Float),
    field("wind_speed", FieldKind::Float),
];

const WEATHER_RANGES: &[ValidRange] = &[
    range("temperature", -90.0, 60.0), // Celsius
    range("humidity", 0.0, 100.0),     // Percent
    range("pressure", 870.0, 1085.0),  // hPa
    range("wind_speed", 0.0, 120.0),   // m/s
];

const WEATHER_PLAN: &[MetricPlan] = &[
    MetricPlan { field: "temperature", aggregates: AVG_MIN_MAX },
    MetricPlan { field: "humidity", aggregates: AVG_MIN_MAX },
    MetricPlan { field: "pressure", aggregates: AVG_MAX },
    MetricPlan { field: "wind_speed", aggregates: AVG_MAX },
];

const AIR_QUALITY_FIELDS: &[FieldSpec] = &[
    field("pm25", FieldKind::Float),
    field("pm10", FieldKind::Float),
    field("o3", FieldKind::Float),
    field("no2", FieldKind::Float),
    field("so2", FieldKind::Float),
    field("co", FieldKind::Float),
    field("aqi", FieldKind::Integer),
    field("dominant_pollutant", FieldKind::Text),
];

const AIR_QUALITY_RANGES: &[ValidRange] = &[
    range("pm25", 0.0, 1000.0), // ug/m3
    range("pm10", 0.0, 1000.0), // ug/m3
    range("o3", 0.0, 600.0),    // ppb
    range("no2", 0.0, 2000.0),  // ppb
    range("so2", 0.0, 1000.0),  // ppb
    range("co", 0.0, 50.0),     // ppm
    range("aqi", 0.0, 500.0),
];

const AIR_QUALITY_PLAN: &[MetricPlan] = &[
    MetricPlan { field: "aqi", aggregates: AVG_MIN_MAX },
    MetricPlan { field: "pm25", aggregates: AVG_MAX },
    MetricPlan { field: "pm10", aggregates: AVG_MAX },
    MetricPlan { field: "o3", aggregates: AVG },
    MetricPlan { field: "no2", aggregates: AVG },
    MetricPlan { field: "so2", aggregates: AVG },
    MetricPlan { field: "co", aggregates: AVG },
];

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Weather, Dataset::AirQuality];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Weather => "weather",
            Dataset::AirQuality => "air-quality",
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Dataset::Weather => WEATHER_FIELDS,
            Dataset::AirQuality => AIR_QUALITY_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Default physical ranges; these fields are also the gap-filled ones
    pub fn valid_ranges(&self) -> &'static [ValidRange] {
        match self {
            Dataset::Weather => WEATHER_RANGES,
            Dataset::AirQuality => AIR_QUALITY_RANGES,
        }
    }

    pub fn metric_plans(&self) -> &'static [MetricPlan] {
        match self {
            Dataset::Weather => WEATHER_PLAN,
            Dataset::AirQuality => AIR_QUALITY_PLAN,
        }
    }

    /// Field forwarded from the first record of each bucket
    pub fn representative_field(&self) -> Option<&'static str> {
        match self {
            Dataset::Weather => None,
            Dataset::AirQuality => Some("dominant_pollutant"),
        }
    }

    pub fn raw_table(&self) -> &'static str {
        match self {
            Dataset::Weather => "weather_data",
            Dataset::AirQuality => "air_quality_data",
        }
    }

    pub fn aggregate_table(&self) -> &'static str {
        match self {
            Dataset::Weather => "aggregated_weather",
            Dataset::AirQuality => "aggregated_air_quality",
        }
    }

    /// `(column, metric, aggregate)` for every planned statistic, e.g. `avg_temperature`
    pub fn stat_columns(&self) -> Vec<(String, &'static str, AggregateType)> {
        self.metric_plans()
            .iter()
            .flat_map(|plan| {
                plan.aggregates.iter().map(move |agg| {
                    (format!("{}_{}", agg.prefix(), plan.field), plan.field, *agg)
                })
            })
            .collect()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weather" => Ok(Dataset::Weather),
            "air-quality" | "air_quality" => Ok(Dataset::AirQuality),
            other => Err(format!("unknown dataset: {other}")),
        }
    }
}

/// Range table for one dataset, optionally with configured overrides
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTable {
    dataset: Dataset,
    ranges: Vec<ValidRange>,
}

impl RangeTable {
    pub fn for_dataset(dataset: Dataset) -> Self {
        Self {
            dataset,
            ranges: dataset.valid_ranges().to_vec(),
        }
    }

    /// Replace the interval of an existing field
    pub fn with_override(mut self, field: &str, lo: f64, hi: f64) -> CoreResult<Self> {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(CoreError::InvalidRange {
                field: field.to_string(),
                lo,
                hi,
            });
        }
        let dataset = self.dataset;
        let entry = self
            .ranges
            .iter_mut()
            .find(|r| r.field == field)
            .ok_or_else(|| CoreError::UnknownField {
                dataset,
                field: field.to_string(),
            })?;
        entry.lo = lo;
        entry.hi = hi;
        Ok(self)
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    pub fn get(&self, field: &str) -> Option<&ValidRange> {
        self.ranges.iter().find(|r| r.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidRange> {
        self.ranges.iter()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.ranges.iter().map(|r| r.field).collect()
    }
}
