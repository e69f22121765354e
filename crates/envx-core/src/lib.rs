//! Core data types, dataset catalogue, rollups and AQI calculations
//!
//! This crate provides the measurement and bucket structures shared by the
//! cleaning and aggregation stages, the fixed per-dataset constants, and the
//! storage collaborator traits the orchestrator is written against.

pub mod aqi;
pub mod datasets;
pub mod pipeline;
pub mod rollups;
pub mod types;

pub use aqi::*;
pub use datasets::*;
pub use pipeline::*;
pub use rollups::*;
pub use types::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Raw record without a required key field; fails the whole batch
    #[error("Record {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Unknown field '{field}' for dataset {dataset}")]
    UnknownField { dataset: Dataset, field: String },

    #[error("Invalid range for '{field}': min {lo} is greater than max {hi}")]
    InvalidRange { field: String, lo: f64, hi: f64 },
}

pub type CoreResult<T> = Result<T, CoreError>;
