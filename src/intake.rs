//! Patient intake: registration, opening cases, and drafting a patient from
//! free text pasted by the triage team.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{Case, Patient};
use crate::pipeline::assist::extract_fenced_block;
use crate::pipeline::llm::{sanitize_llm_output, LlmClient, LlmError};

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Invalid RUN: {0:?}")]
    InvalidRun(String),

    #[error("A patient with RUN {0} is already registered")]
    DuplicateRun(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Nothing to draft from")]
    EmptyInput,

    #[error("Could not read a patient draft from the reply: {0}")]
    MalformedDraft(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Generation failed: {0}")]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub run: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub history: Option<String>,
    /// Initial progress note of the first case.
    #[serde(default)]
    pub progress_note: Option<String>,
}

/// A registered patient together with the case opened for them.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub patient: Patient,
    pub case: Case,
}

/// Register a patient and open their first case in one transaction.
///
/// Derived clinical state starts empty; it is generated on the first edit.
pub fn register_patient(conn: &Connection, input: NewPatient) -> Result<Admission, IntakeError> {
    let run = input.run.trim();
    if !Patient::is_valid_run(run) {
        return Err(IntakeError::InvalidRun(input.run));
    }
    if repository::get_patient_by_run(conn, run)?.is_some() {
        return Err(IntakeError::DuplicateRun(run.to_string()));
    }

    let patient = Patient::new(run, non_blank(input.name), input.birth_date, non_blank(input.history));
    let case = Case::open(patient.id, non_blank(input.progress_note));

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    repository::insert_patient(&tx, &patient).map_err(|e| match e {
        DatabaseError::ConstraintViolation(_) => IntakeError::DuplicateRun(patient.run.clone()),
        other => other.into(),
    })?;
    repository::insert_case(&tx, &case)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(patient_id = %patient.id, case_id = %case.id, "Patient registered");
    Ok(Admission { patient, case })
}

/// Open a new case for an existing patient.
pub fn open_case(
    conn: &Connection,
    patient_id: &Uuid,
    progress_note: Option<String>,
) -> Result<Case, IntakeError> {
    if repository::get_patient(conn, patient_id)?.is_none() {
        return Err(IntakeError::PatientNotFound(*patient_id));
    }
    let case = Case::open(*patient_id, non_blank(progress_note));
    repository::insert_case(conn, &case)?;
    tracing::info!(patient_id = %patient_id, case_id = %case.id, "Case opened");
    Ok(case)
}

/// Patient fields proposed by the backend. Nothing is stored; the user
/// reviews the draft and submits it through [`register_patient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDraft {
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default, alias = "fecha_nacimiento", deserialize_with = "lenient_date")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, alias = "historia")]
    pub history: Option<String>,
}

const DRAFT_SYSTEM_PROMPT: &str = "Eres un asistente de admisión de un servicio de urgencias. \
Extraes datos sin inventar información.";

fn draft_prompt(raw_text: &str) -> String {
    format!(
        "Texto no estructurado:\n{raw_text}\n\n\
         Extrae los datos del paciente y entrégalos en un bloque ```json con las claves \
         \"run\", \"nombre\", \"fecha_nacimiento\" (AAAA-MM-DD) y \"historia\". \
         Usa null para los datos que no aparezcan en el texto.\n"
    )
}

/// Ask the backend to pull patient identity and history out of free text.
pub fn draft_patient_from_text(llm: &dyn LlmClient, raw_text: &str) -> Result<PatientDraft, IntakeError> {
    if raw_text.trim().is_empty() {
        return Err(IntakeError::EmptyInput);
    }

    let raw = llm.generate(llm.default_model(), &draft_prompt(raw_text), DRAFT_SYSTEM_PROMPT)?;
    let reply = sanitize_llm_output(&raw);
    let block = extract_fenced_block(&reply)
        .ok_or_else(|| IntakeError::MalformedDraft("no fenced JSON block found".into()))?;

    let mut draft: PatientDraft =
        serde_json::from_str(block).map_err(|e| IntakeError::MalformedDraft(e.to_string()))?;
    draft.run = draft.run.map(|r| r.trim().to_uppercase()).filter(|r| !r.is_empty());
    Ok(draft)
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::DerivedStatus;
    use crate::pipeline::llm::MockLlmClient;

    fn new_patient(run: &str) -> NewPatient {
        NewPatient {
            run: run.into(),
            name: Some("Ana Pérez".into()),
            birth_date: NaiveDate::from_ymd_opt(1985, 3, 2),
            history: Some("Asma diagnosticada 2019".into()),
            progress_note: Some("Disnea leve, SpO2 94%".into()),
        }
    }

    #[test]
    fn register_creates_patient_and_first_case() {
        let conn = open_memory_database().unwrap();
        let admission = register_patient(&conn, new_patient(" 12345678-9 ")).unwrap();

        assert_eq!(admission.patient.run, "12345678-9");
        assert_eq!(admission.case.patient_id, admission.patient.id);
        assert!(admission.case.active);

        let case = repository::get_case(&conn, &admission.case.id).unwrap().unwrap();
        assert_eq!(case.progress_note.as_deref(), Some("Disnea leve, SpO2 94%"));
        assert_eq!(case.derived.status, DerivedStatus::Empty);
    }

    #[test]
    fn invalid_run_rejected() {
        let conn = open_memory_database().unwrap();
        let err = register_patient(&conn, new_patient("12.345.678-9")).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidRun(_)));
        assert!(repository::list_patients(&conn).unwrap().is_empty());
    }

    #[test]
    fn duplicate_run_rejected() {
        let conn = open_memory_database().unwrap();
        register_patient(&conn, new_patient("12345678-9")).unwrap();
        let err = register_patient(&conn, new_patient("12345678-9")).unwrap_err();
        assert!(matches!(err, IntakeError::DuplicateRun(_)));
        assert_eq!(repository::list_active_cases(&conn).unwrap().len(), 1);
    }

    #[test]
    fn blank_fields_stored_as_absent() {
        let conn = open_memory_database().unwrap();
        let mut input = new_patient("1234567-K");
        input.history = Some("   ".into());
        input.progress_note = Some(String::new());
        let admission = register_patient(&conn, input).unwrap();
        assert!(admission.patient.history.is_none());
        assert!(admission.case.progress_note.is_none());
    }

    #[test]
    fn open_case_for_existing_patient() {
        let conn = open_memory_database().unwrap();
        let admission = register_patient(&conn, new_patient("12345678-9")).unwrap();
        let case = open_case(&conn, &admission.patient.id, Some("Cefalea".into())).unwrap();
        assert_eq!(
            repository::active_case_ids_for_patient(&conn, &admission.patient.id)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(case.progress_note.as_deref(), Some("Cefalea"));
    }

    #[test]
    fn open_case_unknown_patient() {
        let conn = open_memory_database().unwrap();
        let err = open_case(&conn, &Uuid::new_v4(), None).unwrap_err();
        assert!(matches!(err, IntakeError::PatientNotFound(_)));
    }

    #[test]
    fn draft_reads_spanish_keys() {
        let llm = MockLlmClient::new(
            "```json\n{\"run\": \"12345678-k\", \"nombre\": \"Ana Pérez\", \
             \"fecha_nacimiento\": \"1985-03-02\", \"historia\": \"Asma\"}\n```",
        );
        let draft = draft_patient_from_text(&llm, "Ana Pérez, RUN 12345678-k, asmática").unwrap();
        assert_eq!(draft.run.as_deref(), Some("12345678-K"));
        assert_eq!(draft.name.as_deref(), Some("Ana Pérez"));
        assert_eq!(draft.birth_date, NaiveDate::from_ymd_opt(1985, 3, 2));
        assert_eq!(draft.history.as_deref(), Some("Asma"));
        assert!(llm.last_prompt().unwrap().contains("asmática"));
    }

    #[test]
    fn draft_tolerates_missing_and_bad_fields() {
        let llm = MockLlmClient::new(
            "```json\n{\"nombre\": \"Ana\", \"fecha_nacimiento\": \"marzo 1985\", \"run\": null}\n```",
        );
        let draft = draft_patient_from_text(&llm, "Ana").unwrap();
        assert_eq!(draft.name.as_deref(), Some("Ana"));
        assert!(draft.birth_date.is_none());
        assert!(draft.run.is_none());
    }

    #[test]
    fn draft_without_block_is_malformed() {
        let llm = MockLlmClient::new("Nombre: Ana");
        let err = draft_patient_from_text(&llm, "Ana").unwrap_err();
        assert!(matches!(err, IntakeError::MalformedDraft(_)));
    }

    #[test]
    fn draft_backend_failure_propagates() {
        let llm = MockLlmClient::timing_out();
        let err = draft_patient_from_text(&llm, "Ana").unwrap_err();
        assert!(matches!(err, IntakeError::Llm(LlmError::Timeout(_))));
    }

    #[test]
    fn draft_empty_input_makes_no_call() {
        let llm = MockLlmClient::new("");
        assert!(matches!(
            draft_patient_from_text(&llm, "  "),
            Err(IntakeError::EmptyInput)
        ));
        assert_eq!(llm.call_count(), 0);
    }
}
