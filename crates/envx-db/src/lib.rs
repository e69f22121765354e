//! Database access layer for the TimescaleDB measurement store
//!
//! Uses the existing tables - NO migrations. Raw tables are read with an
//! optional time filter; raw and aggregated tables are only ever appended to.

pub mod client;
pub mod queries;
pub mod schema;

pub use client::*;
pub use schema::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type DbResult<T> = Result<T, DbError>;
