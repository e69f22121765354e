//! Fixed-window bucket aggregation
//!
//! Groups cleaned measurements by `(truncated timestamp, location)` and
//! reduces each group to an [`envx_core::AggregatedBucket`].

pub mod aggregator;
pub mod bucket;

pub use aggregator::*;
pub use bucket::*;
