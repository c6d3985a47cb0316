//! Persistence boundary of the derived-state pipeline.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::types::DerivedRecord;
use crate::db::DatabaseError;
use crate::models::{Case, DerivedStatus};

/// Case reads and derived-state writes needed by the synchronizer.
///
/// Every write is a single-statement update, so each call is atomic on its own
/// and no transaction is held across a generation call.
pub trait CaseStore: Send + Sync {
    fn read_case(&self, conn: &Connection, case_id: &Uuid) -> Result<Case, DatabaseError>;

    /// History of the patient owning a case; the other half of a generation request.
    fn read_patient_history(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<Option<String>, DatabaseError>;

    fn is_case_active(&self, conn: &Connection, case_id: &Uuid) -> Result<bool, DatabaseError>;

    fn active_case_ids_for_patient(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<Vec<Uuid>, DatabaseError>;

    /// Mark a trigger as started. Returns the trigger's sequence number, or
    /// `None` when the case is closed.
    fn begin_sync(&self, conn: &Connection, case_id: &Uuid) -> Result<Option<i64>, DatabaseError>;

    /// Overwrite all four derived fields and the timestamp together.
    ///
    /// Returns the resulting status (`current` if `seq` is still the latest
    /// trigger, `stale` otherwise), or `None` if the case closed meanwhile and
    /// nothing was written.
    fn write_derived_state(
        &self,
        conn: &Connection,
        case_id: &Uuid,
        record: &DerivedRecord,
        committed_at: &DateTime<Utc>,
        seq: i64,
    ) -> Result<Option<DerivedStatus>, DatabaseError>;

    /// Flag a failed trigger. Leaves fields and timestamp untouched and does
    /// nothing when a newer trigger is outstanding.
    fn mark_sync_failed(&self, conn: &Connection, case_id: &Uuid, seq: i64) -> Result<(), DatabaseError>;
}
