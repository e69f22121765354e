//! Job names accepted on the command line and the stages they run

use envx_core::Dataset;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Job {
    /// Clean raw weather data and report counts
    Process,
    /// Hourly and daily weather buckets
    Aggregate,
    /// Clean raw air quality data and report counts
    AirProcess,
    /// Hourly and daily air quality buckets
    AirAggregate,
    /// air-process then air-aggregate
    AirAll,
    /// Every weather and air quality stage
    All,
    /// Load a JSON file of raw records into the raw table
    Ingest,
}

/// One unit of work inside a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Process(Dataset),
    Aggregate(Dataset),
    Ingest(Dataset),
}

impl Stage {
    pub fn dataset(&self) -> Dataset {
        match self {
            Stage::Process(d) | Stage::Aggregate(d) | Stage::Ingest(d) => *d,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Process(_) => "process",
            Stage::Aggregate(_) => "aggregate",
            Stage::Ingest(_) => "ingest",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.dataset())
    }
}

impl Job {
    /// Stages in execution order; `ingest_dataset` only matters for [`Job::Ingest`]
    pub fn stages(&self, ingest_dataset: Dataset) -> Vec<Stage> {
        use Dataset::{AirQuality, Weather};

        match self {
            Job::Process => vec![Stage::Process(Weather)],
            Job::Aggregate => vec![Stage::Aggregate(Weather)],
            Job::AirProcess => vec![Stage::Process(AirQuality)],
            Job::AirAggregate => vec![Stage::Aggregate(AirQuality)],
            Job::AirAll => vec![Stage::Process(AirQuality), Stage::Aggregate(AirQuality)],
            Job::All => vec![
                Stage::Process(Weather),
                Stage::Aggregate(Weather),
                Stage::Process(AirQuality),
                Stage::Aggregate(AirQuality),
            ],
            Job::Ingest => vec![Stage::Ingest(ingest_dataset)],
        }
    }

    pub fn reads_files(&self) -> bool {
        matches!(self, Job::Ingest)
    }
}
