//! Clinical report generation (discharge, admission, referral).

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{Case, Patient, ReportKind};
use crate::pipeline::llm::{sanitize_llm_output, LlmClient, LlmError};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Case not found: {0}")]
    CaseNotFound(Uuid),

    #[error("Generation returned an empty report")]
    EmptyReport,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Generation failed: {0}")]
    Llm(#[from] LlmError),
}

const REPORT_SYSTEM_PROMPT: &str = "Eres un médico de urgencias que redacta documentos clínicos \
en español médico chileno, en texto plano y sin inventar datos.";

fn report_instructions(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::OutpatientDischarge => {
            "Redacta un informe de alta ambulatoria: motivo de consulta, evolución en urgencias, \
             diagnóstico de egreso, indicaciones al alta, signos de alarma y controles."
        }
        ReportKind::Hospitalization => {
            "Redacta una solicitud de hospitalización: resumen clínico, hallazgos relevantes, \
             diagnósticos, tratamiento realizado y motivo de ingreso."
        }
        ReportKind::Referral => {
            "Redacta una interconsulta: antecedentes pertinentes, cuadro actual, estudio realizado \
             y pregunta concreta al especialista."
        }
    }
}

pub fn build_report_prompt(kind: ReportKind, patient: &Patient, case: &Case) -> String {
    format!(
        "Tipo de documento: {title}\n\n\
         Historia clínica del paciente:\n{history}\n\n\
         Detalle de la atención:\n{progress}\n\n\
         {instructions}\n",
        title = kind.title(),
        history = patient.history_text(),
        progress = case.progress_text(),
        instructions = report_instructions(kind),
    )
}

/// Generate a report for a case and store it as the case's final report.
///
/// Closed cases may still get a report; a discharge is usually written last.
pub fn generate_report(
    conn: &Connection,
    llm: &dyn LlmClient,
    case_id: &Uuid,
    kind: ReportKind,
) -> Result<Case, ReportError> {
    let case = repository::get_case(conn, case_id)?.ok_or(ReportError::CaseNotFound(*case_id))?;
    let patient = repository::get_patient(conn, &case.patient_id)?
        .ok_or_else(|| DatabaseError::not_found("patient", case.patient_id))?;

    let prompt = build_report_prompt(kind, &patient, &case);
    let report = sanitize_llm_output(&llm.generate(llm.default_model(), &prompt, REPORT_SYSTEM_PROMPT)?);
    if report.is_empty() {
        return Err(ReportError::EmptyReport);
    }

    repository::save_final_report(conn, case_id, &report)?;
    tracing::info!(case_id = %case_id, kind = kind.as_str(), "Report generated");

    repository::get_case(conn, case_id)?.ok_or(ReportError::CaseNotFound(*case_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::intake::{register_patient, NewPatient};
    use crate::pipeline::llm::MockLlmClient;

    fn admit(conn: &Connection) -> Case {
        register_patient(
            conn,
            NewPatient {
                run: "12345678-9".into(),
                name: None,
                birth_date: None,
                history: Some("Asma diagnosticada 2019".into()),
                progress_note: Some("Disnea leve, SpO2 94%. NBZ x3, SpO2 97%.".into()),
            },
        )
        .unwrap()
        .case
    }

    #[test]
    fn report_stored_as_final_report() {
        let conn = open_memory_database().unwrap();
        let case = admit(&conn);
        let llm = MockLlmClient::new("<think>borrador</think>Alta con salbutamol c/6h.");

        let updated =
            generate_report(&conn, &llm, &case.id, ReportKind::OutpatientDischarge).unwrap();
        assert_eq!(updated.final_report.as_deref(), Some("Alta con salbutamol c/6h."));

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("Alta ambulatoria"));
        assert!(prompt.contains("Asma diagnosticada 2019"));
        assert!(prompt.contains("NBZ x3"));
    }

    #[test]
    fn each_kind_has_its_own_instructions() {
        let mut seen: Vec<&str> = ReportKind::all().iter().map(|k| report_instructions(*k)).collect();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn backend_failure_leaves_report_unset() {
        let conn = open_memory_database().unwrap();
        let case = admit(&conn);
        let llm = MockLlmClient::timing_out();

        let err = generate_report(&conn, &llm, &case.id, ReportKind::Referral).unwrap_err();
        assert!(matches!(err, ReportError::Llm(LlmError::Timeout(_))));
        let stored = repository::get_case(&conn, &case.id).unwrap().unwrap();
        assert!(stored.final_report.is_none());
    }

    #[test]
    fn empty_generation_rejected() {
        let conn = open_memory_database().unwrap();
        let case = admit(&conn);
        let llm = MockLlmClient::new("  ");
        let err = generate_report(&conn, &llm, &case.id, ReportKind::Hospitalization).unwrap_err();
        assert!(matches!(err, ReportError::EmptyReport));
    }

    #[test]
    fn unknown_case_is_not_found() {
        let conn = open_memory_database().unwrap();
        let llm = MockLlmClient::new("x");
        let err = generate_report(&conn, &llm, &Uuid::new_v4(), ReportKind::Referral).unwrap_err();
        assert!(matches!(err, ReportError::CaseNotFound(_)));
        assert_eq!(llm.call_count(), 0);
    }
}
