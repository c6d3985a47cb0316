//! Decides whether a committed field write warrants regeneration.

use rusqlite::Connection;
use uuid::Uuid;

use super::traits::CaseStore;
use super::types::{FieldWrite, WatchedField};
use crate::db::DatabaseError;

/// Absent and empty text are the same value.
pub fn value_changed(previous: Option<&str>, current: Option<&str>) -> bool {
    previous.unwrap_or_default() != current.unwrap_or_default()
}

/// Active cases that need one trigger each for this write.
///
/// A history write fans out to every open case of the patient. A progress
/// note write concerns its own case, and only while that case is open.
pub fn cases_to_sync(
    store: &dyn CaseStore,
    conn: &Connection,
    write: &FieldWrite,
) -> Result<Vec<Uuid>, DatabaseError> {
    if !value_changed(write.previous.as_deref(), write.current.as_deref()) {
        return Ok(Vec::new());
    }

    match write.field {
        WatchedField::PatientHistory => store.active_case_ids_for_patient(conn, &write.owner_id),
        WatchedField::ProgressNote => {
            if store.is_case_active(conn, &write.owner_id)? {
                Ok(vec![write.owner_id])
            } else {
                Ok(Vec::new())
            }
        }
    }
}
