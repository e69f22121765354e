//! JSON record files used by the ingest job and as test fixtures

use anyhow::{Context, Result};
use envx_core::{Dataset, RawMeasurement, Source, TimeRange};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load raw records from a JSON array file
pub fn load_records(path: &Path) -> Result<Vec<RawMeasurement>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read records: {:?}", path))?;

    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse records JSON: {:?}", path))
}

/// Save raw records as a JSON array (for creating test data)
pub fn save_records(path: &Path, records: &[RawMeasurement]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json).with_context(|| format!("Failed to write records: {:?}", path))?;
    Ok(())
}

/// Source over one JSON file; the dataset argument is not checked
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source for JsonFileSource {
    async fn read_records(&self, dataset: Dataset, range: &TimeRange) -> Result<Vec<RawMeasurement>> {
        let mut records = load_records(&self.path)?;
        // Records without a timestamp are kept so conversion can reject them
        records.retain(|r| r.timestamp.map_or(true, |ts| range.contains(ts)));
        debug!("Loaded {} {} records from {:?}", records.len(), dataset, self.path);
        Ok(records)
    }
}
