//! Persistence layer modules.

pub mod db;
pub mod intention_repo;
pub mod reminder_repo;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

use chrono::{DateTime, Utc};

use crate::{AppError, Result};

/// Parse an RFC 3339 column into a UTC timestamp.
pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

/// Parse an optional RFC 3339 column.
pub(crate) fn parse_optional_timestamp(
    column: &str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(column, s)).transpose()
}
