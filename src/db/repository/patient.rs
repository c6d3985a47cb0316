use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_ts, map_unique_violation, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, run, name, birth_date, history, created_at";

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, run, name, birth_date, history, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            patient.id.to_string(),
            patient.run,
            patient.name,
            patient.birth_date.map(|d| d.to_string()),
            patient.history,
            fmt_ts(&patient.created_at),
        ],
    )
    .map_err(|e| map_unique_violation(e, format!("RUN {} already registered", patient.run)))?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            read_patient_row,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn get_patient_by_run(conn: &Connection, run: &str) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE run = ?1"),
            params![run.trim()],
            read_patient_row,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], read_patient_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

/// Overwrite the patient's history. Returns the value it replaced.
///
/// Read and write happen in one transaction so the previous value handed to
/// the change detector is exactly the one this write replaced.
pub fn update_patient_history(
    conn: &Connection,
    id: &Uuid,
    history: Option<&str>,
) -> Result<Option<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    let previous: Option<String> = tx
        .query_row(
            "SELECT history FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| DatabaseError::not_found("patient", id))?;

    tx.execute(
        "UPDATE patients SET history = ?1 WHERE id = ?2",
        params![history, id.to_string()],
    )?;
    tx.commit()?;

    Ok(previous)
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct PatientRow {
    id: String,
    run: String,
    name: Option<String>,
    birth_date: Option<String>,
    history: Option<String>,
    created_at: String,
}

fn read_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        run: row.get(1)?,
        name: row.get(2)?,
        birth_date: row.get(3)?,
        history: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_uuid(&row.id)?,
        run: row.run,
        name: row.name,
        birth_date: row
            .birth_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        history: row.history,
        created_at: parse_ts(&row.created_at)?,
    })
}
