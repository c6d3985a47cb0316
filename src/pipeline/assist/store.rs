//! SQLite-backed [`CaseStore`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::traits::CaseStore;
use super::types::DerivedRecord;
use crate::db::repository::{self, fmt_ts};
use crate::db::DatabaseError;
use crate::models::{Case, DerivedStatus};

pub struct SqliteCaseStore;

impl SqliteCaseStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteCaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseStore for SqliteCaseStore {
    fn read_case(&self, conn: &Connection, case_id: &Uuid) -> Result<Case, DatabaseError> {
        repository::get_case(conn, case_id)?.ok_or_else(|| DatabaseError::not_found("case", case_id))
    }

    fn read_patient_history(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<Option<String>, DatabaseError> {
        repository::get_patient(conn, patient_id)?
            .map(|p| p.history)
            .ok_or_else(|| DatabaseError::not_found("patient", patient_id))
    }

    fn is_case_active(&self, conn: &Connection, case_id: &Uuid) -> Result<bool, DatabaseError> {
        repository::is_case_active(conn, case_id)
    }

    fn active_case_ids_for_patient(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<Vec<Uuid>, DatabaseError> {
        repository::active_case_ids_for_patient(conn, patient_id)
    }

    fn begin_sync(&self, conn: &Connection, case_id: &Uuid) -> Result<Option<i64>, DatabaseError> {
        let seq = conn
            .query_row(
                "UPDATE cases SET sync_seq = sync_seq + 1, derived_status = 'pending'
                 WHERE id = ?1 AND active = 1
                 RETURNING sync_seq",
                params![case_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq)
    }

    fn write_derived_state(
        &self,
        conn: &Connection,
        case_id: &Uuid,
        record: &DerivedRecord,
        committed_at: &DateTime<Utc>,
        seq: i64,
    ) -> Result<Option<DerivedStatus>, DatabaseError> {
        let status: Option<String> = conn
            .query_row(
                "UPDATE cases SET
                    differential_diagnosis = ?1,
                    suggested_management = ?2,
                    next_action = ?3,
                    alerts = ?4,
                    derived_updated_at = ?5,
                    derived_status = CASE WHEN sync_seq = ?6 THEN 'current' ELSE 'stale' END
                 WHERE id = ?7 AND active = 1
                 RETURNING derived_status",
                params![
                    record.differential_diagnosis,
                    record.suggested_management,
                    record.next_action,
                    record.alerts,
                    fmt_ts(committed_at),
                    seq,
                    case_id.to_string(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        status.as_deref().map(DerivedStatus::from_str).transpose()
    }

    fn mark_sync_failed(&self, conn: &Connection, case_id: &Uuid, seq: i64) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE cases SET derived_status = 'stale'
             WHERE id = ?1 AND sync_seq = ?2 AND active = 1",
            params![case_id.to_string(), seq],
        )?;
        Ok(())
    }
}
