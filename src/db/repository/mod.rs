//! Repository layer: entity-scoped database operations.
//!
//! Patients and cases. The AI-derived columns of `cases` are only written
//! through `pipeline::assist::SqliteCaseStore`.

mod case;
mod patient;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::DatabaseError;

pub use case::*;
pub use patient::*;

/// Timestamps are stored as fixed-width RFC 3339 text so they sort lexically.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {raw}: {e}")))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

/// Turn a UNIQUE/FK failure into a readable `ConstraintViolation`.
pub(crate) fn map_unique_violation(err: rusqlite::Error, message: String) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(message)
        }
        _ => DatabaseError::Sqlite(err),
    }
}
