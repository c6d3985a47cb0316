//! Patient endpoints.
//!
//! - `GET /api/patients`: registered patients, newest first
//! - `POST /api/patients`: register a patient and open the first case
//! - `POST /api/patients/draft`: extract a patient from pasted text
//! - `GET /api/patients/:id`: patient with all their cases
//! - `PUT /api/patients/:id/history`: replace the clinical history
//! - `POST /api/patients/:id/history/append`: merge raw notes into the history

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, HistoryBody, PatientDetail, TextBody};
use crate::charting::{self, EditOutcome};
use crate::db::repository;
use crate::intake::{self, Admission, NewPatient, PatientDraft};
use crate::models::Patient;

pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<Patient>>, ApiError> {
    let patients = ctx
        .blocking(|_, conn| Ok(repository::list_patients(conn)?))
        .await?;
    Ok(Json(patients))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Json(body): Json<NewPatient>,
) -> Result<(StatusCode, Json<Admission>), ApiError> {
    let admission = ctx
        .blocking(move |_, conn| Ok(intake::register_patient(conn, body)?))
        .await?;
    Ok((StatusCode::CREATED, Json(admission)))
}

pub async fn draft(
    State(ctx): State<ApiContext>,
    Json(body): Json<TextBody>,
) -> Result<Json<PatientDraft>, ApiError> {
    let draft = ctx
        .blocking(move |core, _| Ok(intake::draft_patient_from_text(core.llm(), &body.text)?))
        .await?;
    Ok(Json(draft))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientDetail>, ApiError> {
    let patient_id = parse_id(&id)?;
    let detail = ctx
        .blocking(move |_, conn| {
            let patient = repository::get_patient(conn, &patient_id)?
                .ok_or_else(|| ApiError::NotFound(format!("Patient not found: {patient_id}")))?;
            let cases = repository::list_cases_for_patient(conn, &patient_id)?;
            Ok(PatientDetail {
                age: patient.age_on(Utc::now().date_naive()),
                patient,
                cases,
            })
        })
        .await?;
    Ok(Json(detail))
}

/// Always 200 once the history is saved; sync problems travel in the body.
pub async fn update_history(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<HistoryBody>,
) -> Result<Json<EditOutcome<Patient>>, ApiError> {
    let patient_id = parse_id(&id)?;
    let outcome = ctx
        .blocking(move |core, conn| {
            Ok(charting::edit_patient_history(
                conn,
                core.assist(),
                &patient_id,
                body.history.as_deref(),
            )?)
        })
        .await?;
    Ok(Json(outcome))
}

pub async fn append_history(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<TextBody>,
) -> Result<Json<EditOutcome<Patient>>, ApiError> {
    let patient_id = parse_id(&id)?;
    let outcome = ctx
        .blocking(move |core, conn| {
            Ok(charting::append_to_history(
                conn,
                core.assist(),
                core.llm(),
                &patient_id,
                &body.text,
            )?)
        })
        .await?;
    Ok(Json(outcome))
}
