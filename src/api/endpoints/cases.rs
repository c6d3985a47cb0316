//! Case endpoints.
//!
//! - `GET /api/cases`: active-case board, newest first
//! - `POST /api/cases`: open a case for an existing patient
//! - `GET /api/cases/:id`: full case with derived suggestions
//! - `PUT /api/cases/:id/progress`: replace the progress note
//! - `POST /api/cases/:id/progress/append`: add bedside notes through the backend
//! - `POST /api/cases/:id/close`: close the case
//! - `POST /api/cases/:id/report`: generate and store a final report

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{
    parse_id, ApiContext, CaseDetail, CaseSummary, OpenCaseBody, ProgressBody, ReportBody,
    TextBody,
};
use crate::charting::{self, EditOutcome};
use crate::db::{repository, DatabaseError};
use crate::intake;
use crate::models::{Case, ReportKind};
use crate::reports;

pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<CaseSummary>>, ApiError> {
    let summaries = ctx
        .blocking(|_, conn| {
            let now = Utc::now();
            let mut summaries = Vec::new();
            for case in repository::list_active_cases(conn)? {
                let patient = repository::get_patient(conn, &case.patient_id)?
                    .ok_or_else(|| DatabaseError::not_found("patient", case.patient_id))?;
                summaries.push(CaseSummary::new(&case, &patient, now));
            }
            Ok(summaries)
        })
        .await?;
    Ok(Json(summaries))
}

pub async fn open(
    State(ctx): State<ApiContext>,
    Json(body): Json<OpenCaseBody>,
) -> Result<(StatusCode, Json<Case>), ApiError> {
    let case = ctx
        .blocking(move |_, conn| Ok(intake::open_case(conn, &body.patient_id, body.progress_note)?))
        .await?;
    Ok((StatusCode::CREATED, Json(case)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<CaseDetail>, ApiError> {
    let case_id = parse_id(&id)?;
    let detail = ctx
        .blocking(move |_, conn| {
            let case = repository::get_case(conn, &case_id)?
                .ok_or_else(|| ApiError::NotFound(format!("Case not found: {case_id}")))?;
            let patient = repository::get_patient(conn, &case.patient_id)?
                .ok_or_else(|| DatabaseError::not_found("patient", case.patient_id))?;
            Ok(CaseDetail::new(case, patient, Utc::now().date_naive()))
        })
        .await?;
    Ok(Json(detail))
}

/// Always 200 once the note is saved; sync problems travel in the body.
pub async fn update_progress(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> Result<Json<EditOutcome<Case>>, ApiError> {
    let case_id = parse_id(&id)?;
    let outcome = ctx
        .blocking(move |core, conn| {
            Ok(charting::edit_progress_note(
                conn,
                core.assist(),
                &case_id,
                body.progress_note.as_deref(),
            )?)
        })
        .await?;
    Ok(Json(outcome))
}

pub async fn append_progress(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<TextBody>,
) -> Result<Json<EditOutcome<Case>>, ApiError> {
    let case_id = parse_id(&id)?;
    let outcome = ctx
        .blocking(move |core, conn| {
            Ok(charting::append_to_progress_note(
                conn,
                core.assist(),
                core.llm(),
                &case_id,
                &body.text,
            )?)
        })
        .await?;
    Ok(Json(outcome))
}

pub async fn close(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<Case>, ApiError> {
    let case_id = parse_id(&id)?;
    let case = ctx
        .blocking(move |_, conn| Ok(charting::close_case(conn, &case_id)?))
        .await?;
    Ok(Json(case))
}

pub async fn report(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<ReportBody>,
) -> Result<Json<Case>, ApiError> {
    let case_id = parse_id(&id)?;
    let kind = ReportKind::from_str(body.kind.trim())
        .map_err(|_| ApiError::BadRequest(format!("Unknown report kind: {}", body.kind)))?;
    let case = ctx
        .blocking(move |core, conn| Ok(reports::generate_report(conn, core.llm(), &case_id, kind)?))
        .await?;
    Ok(Json(case))
}
