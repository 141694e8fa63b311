//! SQLite storage layer.
//!
//! Checkpoint store and review queue backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod checkpoint;
pub mod pool;
pub mod review;

use chrono::{DateTime, Utc};
use ledgerflow_types::error::RepositoryError;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
