//! EPA Air Quality Index calculation
//!
//! Sub-indices come from piecewise-linear interpolation over fixed breakpoint
//! tables; the overall index is the largest valid sub-index.
//!
//! Supported pollutants: PM2.5 (24-hr, ug/m3), PM10 (24-hr, ug/m3),
//! O3 (8-hr, ppb), NO2 (1-hr, ppb), SO2 (1-hr, ppb), CO (8-hr, ppm).
//!
//! Interpolated values are rounded half to even (`f64::round_ties_even`).

use serde::{Serialize, Serializer};
use std::fmt;

use crate::types::{MeasurementRecord, MetricValue};

/// Highest index any breakpoint table reaches
pub const AQI_MAX: u16 = 500;

/// Reported as the dominant pollutant when no sub-index is valid
pub const NO_DOMINANT_POLLUTANT: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

/// `C_low <= C <= C_high` maps linearly onto `I_low..=I_high`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub c_low: f64,
    pub c_high: f64,
    pub i_low: u16,
    pub i_high: u16,
}

const fn bp(c_low: f64, c_high: f64, i_low: u16, i_high: u16) -> Breakpoint {
    Breakpoint {
        c_low,
        c_high,
        i_low,
        i_high,
    }
}

const PM25_BREAKPOINTS: &[Breakpoint] = &[
    bp(0.0, 12.0, 0, 50),
    bp(12.1, 35.4, 51, 100),
    bp(35.5, 55.4, 101, 150),
    bp(55.5, 150.4, 151, 200),
    bp(150.5, 250.4, 201, 300),
    bp(250.5, 500.4, 301, 500),
];

const PM10_BREAKPOINTS: &[Breakpoint] = &[
    bp(0.0, 54.0, 0, 50),
    bp(55.0, 154.0, 51, 100),
    bp(155.0, 254.0, 101, 150),
    bp(255.0, 354.0, 151, 200),
    bp(355.0, 424.0, 201, 300),
    bp(425.0, 604.0, 301, 500),
];

const O3_BREAKPOINTS: &[Breakpoint] = &[
    bp(0.0, 54.0, 0, 50),
    bp(55.0, 70.0, 51, 100),
    bp(71.0, 85.0, 101, 150),
    bp(86.0, 105.0, 151, 200),
    bp(106.0, 200.0, 201, 300),
];

const NO2_BREAKPOINTS: &[Breakpoint] = &[
    bp(0.0, 53.0, 0, 50),
    bp(54.0, 100.0, 51, 100),
    bp(101.0, 360.0, 101, 150),
    bp(361.0, 649.0, 151, 200),
    bp(650.0, 1249.0, 201, 300),
    bp(1250.0, 2049.0, 301, 500),
];

const SO2_BREAKPOINTS: &[Breakpoint] = &[
    bp(0.0, 35.0, 0, 50),
    bp(36.0, 75.0, 51, 100),
    bp(76.0, 185.0, 101, 150),
    bp(186.0, 304.0, 151, 200),
    bp(305.0, 604.0, 201, 300),
    bp(605.0, 1004.0, 301, 500),
];

const CO_BREAKPOINTS: &[Breakpoint] = &[
    bp(0.0, 4.4, 0, 50),
    bp(4.5, 9.4, 51, 100),
    bp(9.5, 12.4, 101, 150),
    bp(12.5, 15.4, 151, 200),
    bp(15.5, 30.4, 201, 300),
    bp(30.5, 50.4, 301, 500),
];

impl Pollutant {
    /// Tie-break order for the dominant pollutant; earlier wins
    pub const PRIORITY: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|p| p.key() == key)
    }

    pub fn breakpoints(&self) -> &'static [Breakpoint] {
        match self {
            Pollutant::Pm25 => PM25_BREAKPOINTS,
            Pollutant::Pm10 => PM10_BREAKPOINTS,
            Pollutant::O3 => O3_BREAKPOINTS,
            Pollutant::No2 => NO2_BREAKPOINTS,
            Pollutant::So2 => SO2_BREAKPOINTS,
            Pollutant::Co => CO_BREAKPOINTS,
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Pollutant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// EPA category bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

const CATEGORY_BANDS: &[(u16, u16, AqiCategory)] = &[
    (0, 50, AqiCategory::Good),
    (51, 100, AqiCategory::Moderate),
    (101, 150, AqiCategory::UnhealthyForSensitiveGroups),
    (151, 200, AqiCategory::Unhealthy),
    (201, 300, AqiCategory::VeryUnhealthy),
    (301, 500, AqiCategory::Hazardous),
];

impl AqiCategory {
    /// Band containing `aqi`; anything above the last band is Hazardous
    pub fn from_aqi(aqi: u16) -> Self {
        CATEGORY_BANDS
            .iter()
            .find(|(lo, hi, _)| (*lo..=*hi).contains(&aqi))
            .map_or(AqiCategory::Hazardous, |(_, _, category)| *category)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AqiCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Sub-index of a known pollutant; `None` when no bracket holds `concentration`
pub fn sub_index(pollutant: Pollutant, concentration: f64) -> Option<u16> {
    pollutant
        .breakpoints()
        .iter()
        .find(|b| b.c_low <= concentration && concentration <= b.c_high)
        .map(|b| {
            let slope = f64::from(b.i_high - b.i_low) / (b.c_high - b.c_low);
            let index = slope * (concentration - b.c_low) + f64::from(b.i_low);
            index.round_ties_even() as u16
        })
}

/// Sub-index by pollutant key.
///
/// Returns `None` for an unknown key or a concentration outside every
/// bracket, negative values included.
pub fn calculate_sub_index(pollutant: &str, concentration: f64) -> Option<u16> {
    Pollutant::from_key(pollutant).and_then(|p| sub_index(p, concentration))
}

/// Optional concentration per pollutant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Concentrations {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
}

impl Concentrations {
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::O3 => self.o3,
            Pollutant::No2 => self.no2,
            Pollutant::So2 => self.so2,
            Pollutant::Co => self.co,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm25 => &mut self.pm25,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::O3 => &mut self.o3,
            Pollutant::No2 => &mut self.no2,
            Pollutant::So2 => &mut self.so2,
            Pollutant::Co => &mut self.co,
        };
        *slot = value;
    }

    /// Build from `(key, value)` pairs; unknown keys are ignored
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<f64>)>) -> Self {
        let mut out = Self::default();
        for (key, value) in pairs {
            if let Some(p) = Pollutant::from_key(key) {
                out.set(p, value);
            }
        }
        out
    }

    pub fn from_record(record: &MeasurementRecord) -> Self {
        Self::from_pairs(
            Pollutant::PRIORITY
                .iter()
                .map(|p| (p.key(), record.get_f64(p.key()))),
        )
    }
}

/// Overall index with its category and dominant pollutant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AqiResult {
    pub aqi: u16,
    pub category: AqiCategory,
    #[serde(serialize_with = "serialize_dominant")]
    pub dominant_pollutant: Option<Pollutant>,
}

fn serialize_dominant<S: Serializer>(
    dominant: &Option<Pollutant>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(dominant.map_or(NO_DOMINANT_POLLUTANT, |p| p.key()))
}

impl AqiResult {
    /// Result reported when no pollutant has a valid sub-index
    pub const EMPTY: AqiResult = AqiResult {
        aqi: 0,
        category: AqiCategory::Good,
        dominant_pollutant: None,
    };

    /// Dominant pollutant key, `"none"` when absent
    pub fn dominant_key(&self) -> &'static str {
        self.dominant_pollutant
            .map_or(NO_DOMINANT_POLLUTANT, |p| p.key())
    }
}

/// Overall AQI: maximum valid sub-index, ties resolved by [`Pollutant::PRIORITY`]
pub fn calculate_aqi(concentrations: &Concentrations) -> AqiResult {
    let mut best: Option<(Pollutant, u16)> = None;

    for pollutant in Pollutant::PRIORITY {
        let Some(index) = concentrations
            .get(pollutant)
            .and_then(|c| sub_index(pollutant, c))
        else {
            continue;
        };
        // Strictly greater keeps the earlier pollutant on ties
        if best.map_or(true, |(_, top)| index > top) {
            best = Some((pollutant, index));
        }
    }

    match best {
        Some((pollutant, aqi)) => AqiResult {
            aqi,
            category: AqiCategory::from_aqi(aqi),
            dominant_pollutant: Some(pollutant),
        },
        None => AqiResult::EMPTY,
    }
}

/// Stamp `aqi` and `dominant_pollutant` onto a record whose `aqi` is null.
///
/// Returns whether the record was changed.
pub fn annotate_missing_aqi(record: &mut MeasurementRecord) -> bool {
    if !record.get("aqi").is_null() {
        return false;
    }
    let result = calculate_aqi(&Concentrations::from_record(record));
    record.set("aqi", MetricValue::Integer(i64::from(result.aqi)));
    record.set("dominant_pollutant", result.dominant_key());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_bracket_edges_hit_index_edges() {
        for pollutant in Pollutant::PRIORITY {
            for b in pollutant.breakpoints() {
                assert_eq!(sub_index(pollutant, b.c_low), Some(b.i_low), "{pollutant} {b:?}");
                assert_eq!(sub_index(pollutant, b.c_high), Some(b.i_high), "{pollutant} {b:?}");
            }
        }
    }

    #[test]
    fn test_monotonic_within_bracket() {
        for pollutant in Pollutant::PRIORITY {
            for b in pollutant.breakpoints() {
                let mut previous = 0;
                for step in 0..=100 {
                    let c = (b.c_low + (b.c_high - b.c_low) * f64::from(step) / 100.0).min(b.c_high);
                    let index = sub_index(pollutant, c).unwrap();
                    assert!(index >= previous, "{pollutant} at {c}");
                    previous = index;
                }
            }
        }
    }

    #[test]
    fn test_tables_are_ascending_and_disjoint() {
        for pollutant in Pollutant::PRIORITY {
            let table = pollutant.breakpoints();
            for pair in table.windows(2) {
                assert!(pair[0].c_high < pair[1].c_low);
                assert!(pair[0].i_high < pair[1].i_low);
            }
            assert_eq!(table[0].c_low, 0.0);
        }
    }

    #[test]
    fn test_sub_index_interpolates() {
        // 51 + (49 / 23.3) * (20.0 - 12.1) = 67.61
        assert_eq!(calculate_sub_index("pm25", 20.0), Some(68));
        assert_eq!(calculate_sub_index("co", 7.0), Some(76));
    }

    #[test]
    fn test_sub_index_invalid_inputs() {
        assert_eq!(calculate_sub_index("lead", 1.0), None);
        assert_eq!(calculate_sub_index("pm25", -0.1), None);
        assert_eq!(calculate_sub_index("pm25", 500.5), None);
        assert_eq!(calculate_sub_index("o3", 201.0), None);
        assert_eq!(calculate_sub_index("pm25", f64::NAN), None);
        // Gap between two brackets
        assert_eq!(calculate_sub_index("pm25", 12.05), None);
    }

    #[test]
    fn test_no_concentrations() {
        let result = calculate_aqi(&Concentrations::default());
        assert_eq!(result, AqiResult::EMPTY);
        assert_eq!(result.category.label(), "Good");
        assert_eq!(result.dominant_key(), "none");
    }

    #[test]
    fn test_top_of_pm25_scale() {
        let result = calculate_aqi(&Concentrations {
            pm25: Some(500.4),
            ..Default::default()
        });
        assert_eq!(result.aqi, 500);
        assert_eq!(result.category, AqiCategory::Hazardous);
        assert_eq!(result.dominant_pollutant, Some(Pollutant::Pm25));
        insta::assert_snapshot!(
            serde_json::to_string(&result).unwrap(),
            @r#"{"aqi":500,"category":"Hazardous","dominant_pollutant":"pm25"}"#
        );
    }

    #[test]
    fn test_maximum_wins() {
        let result = calculate_aqi(&Concentrations {
            pm25: Some(8.0),
            o3: Some(90.0),
            co: Some(1.0),
            ..Default::default()
        });
        // 151 + (49 / 19) * (90 - 86) = 161.3
        assert_eq!(result.aqi, 161);
        assert_eq!(result.dominant_pollutant, Some(Pollutant::O3));
        assert_eq!(result.category, AqiCategory::Unhealthy);
    }

    #[test]
    fn test_ties_follow_priority_order() {
        // pm10 at 154 and pm25 at 35.4 both sit exactly on index 100
        let result = calculate_aqi(&Concentrations {
            pm10: Some(154.0),
            pm25: Some(35.4),
            ..Default::default()
        });
        assert_eq!(result.aqi, 100);
        assert_eq!(result.dominant_pollutant, Some(Pollutant::Pm25));

        let result = calculate_aqi(&Concentrations::from_pairs([
            ("no2", Some(100.0)),
            ("o3", Some(70.0)),
            ("so2", Some(75.0)),
        ]));
        assert_eq!(result.aqi, 100);
        assert_eq!(result.dominant_pollutant, Some(Pollutant::O3));
    }

    #[test]
    fn test_invalid_pollutants_are_skipped() {
        let result = calculate_aqi(&Concentrations {
            pm25: Some(-4.0),
            pm10: Some(10_000.0),
            no2: Some(20.0),
            ..Default::default()
        });
        assert_eq!(result.aqi, 19);
        assert_eq!(result.dominant_pollutant, Some(Pollutant::No2));

        let result = calculate_aqi(&Concentrations {
            pm25: Some(-4.0),
            ..Default::default()
        });
        assert_eq!(result, AqiResult::EMPTY);
    }

    #[test]
    fn test_category_bands() {
        assert_eq!(AqiCategory::from_aqi(0), AqiCategory::Good);
        assert_eq!(AqiCategory::from_aqi(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_aqi(51), AqiCategory::Moderate);
        assert_eq!(
            AqiCategory::from_aqi(150).label(),
            "Unhealthy for Sensitive Groups"
        );
        assert_eq!(AqiCategory::from_aqi(300), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_aqi(AQI_MAX), AqiCategory::Hazardous);
        assert_eq!(AqiCategory::from_aqi(999), AqiCategory::Hazardous);
    }

    #[test]
    fn test_annotate_missing_aqi() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut record = MeasurementRecord::new(ts, "delhi")
            .with("pm25", 55.4)
            .with("aqi", MetricValue::Null);

        assert!(annotate_missing_aqi(&mut record));
        assert_eq!(record.get("aqi"), &MetricValue::Integer(150));
        assert_eq!(record.get("dominant_pollutant").as_str(), Some("pm25"));

        // Existing values are left alone
        record.set("pm25", 300.0);
        assert!(!annotate_missing_aqi(&mut record));
        assert_eq!(record.get("aqi"), &MetricValue::Integer(150));
    }
}
