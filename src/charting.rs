//! Edits to the two watched text fields, plus case closure.
//!
//! Every edit commits first and only then hands the write to [`AssistSync`].
//! Whatever the synchronizer reports, the edit itself stands; failures come
//! back as a user-facing notice next to the saved record.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{Case, Patient};
use crate::pipeline::assist::{AssistSync, FieldWrite, SyncReport};
use crate::pipeline::llm::{sanitize_llm_output, LlmClient, LlmError};

/// Shown whenever any triggered regeneration warned or failed.
pub const SUGGESTIONS_UNAVAILABLE: &str =
    "Las sugerencias clínicas derivadas no están disponibles temporalmente.";

const CHARTING_SYSTEM_PROMPT: &str = "Eres un especialista en medicina de urgencias y en \
documentación clínica. Escribes en español médico chileno, conciso y en texto plano.";

#[derive(Error, Debug)]
pub enum ChartingError {
    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Case not found: {0}")]
    CaseNotFound(Uuid),

    #[error("Nothing to add")]
    EmptyInput,

    #[error("Generation returned no usable text")]
    EmptyGeneration,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Generation failed: {0}")]
    Llm(#[from] LlmError),
}

/// A committed edit, the sync it triggered, and an optional notice for the user.
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome<T> {
    pub record: T,
    pub sync: Vec<SyncReport>,
    pub notice: Option<String>,
}

// ═══════════════════════════════════════════
// Direct edits
// ═══════════════════════════════════════════

pub fn edit_patient_history(
    conn: &Connection,
    assist: &AssistSync,
    patient_id: &Uuid,
    history: Option<&str>,
) -> Result<EditOutcome<Patient>, ChartingError> {
    let previous = repository::update_patient_history(conn, patient_id, history)
        .map_err(|e| not_found_as(e, ChartingError::PatientNotFound(*patient_id)))?;

    let write = FieldWrite::history(*patient_id, previous, history.map(str::to_string));
    let (sync, notice) = run_sync(assist, conn, &write);

    let patient = repository::get_patient(conn, patient_id)?
        .ok_or(ChartingError::PatientNotFound(*patient_id))?;
    Ok(EditOutcome {
        record: patient,
        sync,
        notice,
    })
}

pub fn edit_progress_note(
    conn: &Connection,
    assist: &AssistSync,
    case_id: &Uuid,
    progress_note: Option<&str>,
) -> Result<EditOutcome<Case>, ChartingError> {
    let previous = repository::update_progress_note(conn, case_id, progress_note)
        .map_err(|e| not_found_as(e, ChartingError::CaseNotFound(*case_id)))?;

    let write = FieldWrite::progress_note(*case_id, previous, progress_note.map(str::to_string));
    let (sync, notice) = run_sync(assist, conn, &write);

    let case = repository::get_case(conn, case_id)?.ok_or(ChartingError::CaseNotFound(*case_id))?;
    Ok(EditOutcome {
        record: case,
        sync,
        notice,
    })
}

fn run_sync(assist: &AssistSync, conn: &Connection, write: &FieldWrite) -> (Vec<SyncReport>, Option<String>) {
    match assist.on_field_write(conn, write) {
        Ok(reports) => {
            let notice = reports
                .iter()
                .any(|r| r.outcome.needs_notice())
                .then(|| SUGGESTIONS_UNAVAILABLE.to_string());
            (reports, notice)
        }
        Err(e) => {
            tracing::error!(
                field = write.field.as_str(),
                owner_id = %write.owner_id,
                error = %e,
                "Could not determine cases to synchronize"
            );
            (Vec::new(), Some(SUGGESTIONS_UNAVAILABLE.to_string()))
        }
    }
}

fn not_found_as(err: DatabaseError, replacement: ChartingError) -> ChartingError {
    match err {
        DatabaseError::NotFound { .. } => replacement,
        other => other.into(),
    }
}

// ═══════════════════════════════════════════
// Backend-assisted appends
// ═══════════════════════════════════════════

/// Merge raw notes into the patient's history through the backend, then
/// save the result as a normal history edit.
///
/// A backend failure fails the request and writes nothing.
pub fn append_to_history(
    conn: &Connection,
    assist: &AssistSync,
    llm: &dyn LlmClient,
    patient_id: &Uuid,
    raw_text: &str,
) -> Result<EditOutcome<Patient>, ChartingError> {
    if raw_text.trim().is_empty() {
        return Err(ChartingError::EmptyInput);
    }
    let patient = repository::get_patient(conn, patient_id)?
        .ok_or(ChartingError::PatientNotFound(*patient_id))?;

    let prompt = format!(
        "Historia actual:\n{}\n\nNuevo texto en bruto:\n{raw_text}\n\n\
         Genera una historia clínica actualizada y coherente que integre el texto nuevo. \
         Responde solo con la historia.\n",
        patient.history_text()
    );
    let merged = sanitize_llm_output(&llm.generate(llm.default_model(), &prompt, CHARTING_SYSTEM_PROMPT)?);
    if merged.is_empty() {
        return Err(ChartingError::EmptyGeneration);
    }

    edit_patient_history(conn, assist, patient_id, Some(&merged))
}

/// Turn raw bedside notes into an incremental record and append it to the
/// case's progress note.
pub fn append_to_progress_note(
    conn: &Connection,
    assist: &AssistSync,
    llm: &dyn LlmClient,
    case_id: &Uuid,
    raw_text: &str,
) -> Result<EditOutcome<Case>, ChartingError> {
    if raw_text.trim().is_empty() {
        return Err(ChartingError::EmptyInput);
    }
    let case = repository::get_case(conn, case_id)?.ok_or(ChartingError::CaseNotFound(*case_id))?;
    let patient = repository::get_patient(conn, &case.patient_id)?
        .ok_or(ChartingError::PatientNotFound(case.patient_id))?;

    let prompt = format!(
        "<historia>\n{}\n</historia>\n\n\
         <atencion_actual>\n{}\n</atencion_actual>\n\n\
         <nuevo_texto_atencion>\n{raw_text}\n</nuevo_texto_atencion>\n\n\
         Genera un registro incremental del proceso de atención en orden cronológico, \
         con las evaluaciones, intervenciones y cambios relevantes del paciente. \
         Usa abreviaciones médicas reconocidas y evita interpretaciones. \
         Presenta el registro dentro de etiquetas <registro_atencion>.\n",
        patient.history_text(),
        case.progress_text()
    );
    let reply = sanitize_llm_output(&llm.generate(llm.default_model(), &prompt, CHARTING_SYSTEM_PROMPT)?);
    let increment = extract_tagged(&reply, "registro_atencion").unwrap_or(reply.as_str()).trim();
    if increment.is_empty() {
        return Err(ChartingError::EmptyGeneration);
    }

    let note = match case.progress_text() {
        "" => increment.to_string(),
        existing => format!("{existing}\n{increment}"),
    };
    edit_progress_note(conn, assist, case_id, Some(&note))
}

/// Contents of the first `<tag>...</tag>` pair, if closed.
pub fn extract_tagged<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(&text[start..start + len])
}

// ═══════════════════════════════════════════
// Closure
// ═══════════════════════════════════════════

/// Close a case. Idempotent; closing an already closed case returns it unchanged.
///
/// Derived state freezes from here on: later edits no longer trigger.
pub fn close_case(conn: &Connection, case_id: &Uuid) -> Result<Case, ChartingError> {
    let closed = repository::close_case(conn, case_id, &Utc::now())
        .map_err(|e| not_found_as(e, ChartingError::CaseNotFound(*case_id)))?;
    if closed {
        tracing::info!(case_id = %case_id, "Case closed");
    } else {
        tracing::debug!(case_id = %case_id, "Case already closed");
    }
    repository::get_case(conn, case_id)?.ok_or(ChartingError::CaseNotFound(*case_id))
}
