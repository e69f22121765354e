//! Batch pipeline over the measurement store
//!
//! This crate coordinates:
//! - Reading raw weather and air quality batches
//! - Cleaning (range validation, de-duplication, gap filling)
//! - Hourly and daily aggregation
//! - Appending results to the database or to JSON-lines files

pub mod files;
pub mod jobs;
pub mod orchestrator;

pub use files::*;
pub use jobs::*;
pub use orchestrator::*;
