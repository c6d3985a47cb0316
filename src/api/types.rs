//! Shared types for the HTTP API layer: router state, request bodies and
//! the listing views.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::models::{Case, DerivedStatus, Patient, SYNOPSIS_LEN};

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    /// Run database and generation work on the blocking pool with a fresh
    /// connection.
    pub async fn blocking<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        F: FnOnce(&CoreState, &Connection) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let core = self.core.clone();
        tokio::task::spawn_blocking(move || {
            let conn = core.open_db()?;
            work(&core, &conn)
        })
        .await?
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid ID format".into()))
}

// ═══════════════════════════════════════════════════════════
// Request bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct HistoryBody {
    #[serde(default)]
    pub history: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    #[serde(default)]
    pub progress_note: Option<String>,
}

/// Raw text to merge through the generation backend.
#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenCaseBody {
    pub patient_id: Uuid,
    #[serde(default)]
    pub progress_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportBody {
    pub kind: String,
}

// ═══════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════

/// One row of the active-case board.
#[derive(Debug, Serialize)]
pub struct CaseSummary {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub run: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `HH:MM` since the case was opened.
    pub elapsed: String,
    pub synopsis: String,
    pub next_action: String,
    pub alerts: Vec<String>,
    pub derived_status: DerivedStatus,
}

impl CaseSummary {
    pub fn new(case: &Case, patient: &Patient, now: DateTime<Utc>) -> Self {
        Self {
            id: case.id,
            patient_id: patient.id,
            run: patient.run.clone(),
            name: patient.name.clone(),
            created_at: case.created_at,
            elapsed: case.elapsed_hhmm(now),
            synopsis: case.synopsis(SYNOPSIS_LEN),
            next_action: case.derived.next_action.clone(),
            alerts: case.derived.alert_list(),
            derived_status: case.derived.status,
        }
    }
}

/// Full case view with the derived lists already split.
#[derive(Debug, Serialize)]
pub struct CaseDetail {
    pub case: Case,
    pub patient: Patient,
    pub age: Option<i32>,
    pub differential_diagnosis: Vec<String>,
    pub alerts: Vec<String>,
}

impl CaseDetail {
    pub fn new(case: Case, patient: Patient, today: NaiveDate) -> Self {
        Self {
            age: patient.age_on(today),
            differential_diagnosis: case.derived.diagnoses(),
            alerts: case.derived.alert_list(),
            case,
            patient,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatientDetail {
    pub patient: Patient,
    pub age: Option<i32>,
    pub cases: Vec<Case>,
}
