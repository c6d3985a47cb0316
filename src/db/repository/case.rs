use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_ts, map_unique_violation, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const CASE_COLUMNS: &str = "id, patient_id, active, progress_note, final_report, created_at, closed_at,
     differential_diagnosis, suggested_management, next_action, alerts,
     derived_updated_at, derived_status";

pub fn insert_case(conn: &Connection, case: &Case) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO cases (id, patient_id, active, progress_note, final_report, created_at, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            case.id.to_string(),
            case.patient_id.to_string(),
            case.active as i32,
            case.progress_note,
            case.final_report,
            fmt_ts(&case.created_at),
            case.closed_at.as_ref().map(fmt_ts),
        ],
    )
    .map_err(|e| map_unique_violation(e, format!("patient {} does not exist", case.patient_id)))?;
    Ok(())
}

pub fn get_case(conn: &Connection, id: &Uuid) -> Result<Option<Case>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?1"),
            params![id.to_string()],
            read_case_row,
        )
        .optional()?;
    row.map(case_from_row).transpose()
}

/// Open cases, newest first.
pub fn list_active_cases(conn: &Connection) -> Result<Vec<Case>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE active = 1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], read_case_row)?;
    collect_cases(rows)
}

pub fn list_cases_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Case>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE patient_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_case_row)?;
    collect_cases(rows)
}

pub fn active_case_ids_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM cases WHERE patient_id = ?1 AND active = 1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

pub fn is_case_active(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let active: Option<i32> = conn
        .query_row(
            "SELECT active FROM cases WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    active
        .map(|a| a != 0)
        .ok_or_else(|| DatabaseError::not_found("case", id))
}

/// Overwrite the case's progress note. Returns the value it replaced.
///
/// Closed cases are still editable; the change detector decides whether
/// anything downstream happens.
pub fn update_progress_note(
    conn: &Connection,
    id: &Uuid,
    progress_note: Option<&str>,
) -> Result<Option<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    let previous: Option<String> = tx
        .query_row(
            "SELECT progress_note FROM cases WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| DatabaseError::not_found("case", id))?;

    tx.execute(
        "UPDATE cases SET progress_note = ?1 WHERE id = ?2",
        params![progress_note, id.to_string()],
    )?;
    tx.commit()?;

    Ok(previous)
}

/// Close a case. Returns `false` if it was already closed.
///
/// Derived state freezes as it is, except that an in-flight `pending` becomes
/// `stale`: its trigger can no longer commit.
pub fn close_case(conn: &Connection, id: &Uuid, closed_at: &DateTime<Utc>) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET active = 0, closed_at = ?1,
            derived_status = CASE derived_status WHEN 'pending' THEN 'stale' ELSE derived_status END
         WHERE id = ?2 AND active = 1",
        params![fmt_ts(closed_at), id.to_string()],
    )?;
    if changed == 0 {
        // Distinguish "already closed" from "does not exist"
        is_case_active(conn, id)?;
        return Ok(false);
    }
    Ok(true)
}

pub fn save_final_report(conn: &Connection, id: &Uuid, report: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET final_report = ?1 WHERE id = ?2",
        params![report, id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("case", id));
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct CaseRow {
    id: String,
    patient_id: String,
    active: i32,
    progress_note: Option<String>,
    final_report: Option<String>,
    created_at: String,
    closed_at: Option<String>,
    differential_diagnosis: String,
    suggested_management: String,
    next_action: String,
    alerts: String,
    derived_updated_at: Option<String>,
    derived_status: String,
}

fn read_case_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseRow> {
    Ok(CaseRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        active: row.get(2)?,
        progress_note: row.get(3)?,
        final_report: row.get(4)?,
        created_at: row.get(5)?,
        closed_at: row.get(6)?,
        differential_diagnosis: row.get(7)?,
        suggested_management: row.get(8)?,
        next_action: row.get(9)?,
        alerts: row.get(10)?,
        derived_updated_at: row.get(11)?,
        derived_status: row.get(12)?,
    })
}

fn case_from_row(row: CaseRow) -> Result<Case, DatabaseError> {
    Ok(Case {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        active: row.active != 0,
        progress_note: row.progress_note,
        final_report: row.final_report,
        created_at: parse_ts(&row.created_at)?,
        closed_at: row.closed_at.as_deref().map(parse_ts).transpose()?,
        derived: DerivedClinicalState {
            differential_diagnosis: row.differential_diagnosis,
            suggested_management: row.suggested_management,
            next_action: row.next_action,
            alerts: row.alerts,
            updated_at: row.derived_updated_at.as_deref().map(parse_ts).transpose()?,
            status: DerivedStatus::from_str(&row.derived_status)?,
        },
    })
}

fn collect_cases(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<CaseRow>>,
) -> Result<Vec<Case>, DatabaseError> {
    let mut cases = Vec::new();
    for row in rows {
        cases.push(case_from_row(row?)?);
    }
    Ok(cases)
}
