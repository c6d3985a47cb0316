use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AssistError;
use super::parser::parse_assist_response;
use crate::models::{join_lines, DerivedStatus};
use crate::pipeline::llm::sanitize_llm_output;

/// The two source-of-truth text fields whose writes may trigger regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchedField {
    PatientHistory,
    ProgressNote,
}

impl WatchedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatientHistory => "patient_history",
            Self::ProgressNote => "progress_note",
        }
    }
}

/// A committed write to a watched field, as seen by the change detector.
///
/// `owner_id` is the patient for a history write and the case for a
/// progress note write.
#[derive(Debug, Clone)]
pub struct FieldWrite {
    pub field: WatchedField,
    pub owner_id: Uuid,
    pub previous: Option<String>,
    pub current: Option<String>,
}

impl FieldWrite {
    pub fn history(patient_id: Uuid, previous: Option<String>, current: Option<String>) -> Self {
        Self {
            field: WatchedField::PatientHistory,
            owner_id: patient_id,
            previous,
            current,
        }
    }

    pub fn progress_note(case_id: Uuid, previous: Option<String>, current: Option<String>) -> Self {
        Self {
            field: WatchedField::ProgressNote,
            owner_id: case_id,
            previous,
            current,
        }
    }
}

pub const ASSIST_SYSTEM_PROMPT: &str = "Eres un médico de urgencias que apoya al equipo clínico. \
Respondes solo con el bloque JSON solicitado, en español.";

/// Synthesis input for one case. Built fresh per trigger, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub history_text: String,
    pub progress_text: String,
}

impl GenerationRequest {
    /// Absent fields become empty strings; nothing else is normalised.
    pub fn from_fields(history: Option<&str>, progress_note: Option<&str>) -> Self {
        Self {
            history_text: history.unwrap_or_default().to_string(),
            progress_text: progress_note.unwrap_or_default().to_string(),
        }
    }

    pub fn render_prompt(&self) -> String {
        format!(
            "Historia clínica del paciente:\n{history}\n\n\
             Evolución de la atención actual:\n{progress}\n\n\
             Con esta información entrega un bloque ```json con exactamente estas claves:\n\
             - \"differential_diagnosis\": lista de diagnósticos diferenciales, del más al menos probable\n\
             - \"manejo_sugerido\": texto con el manejo sugerido\n\
             - \"proxima_accion\": texto con la próxima acción concreta\n\
             - \"alertas\": lista de alertas clínicas (lista vacía si no hay)\n",
            history = self.history_text,
            progress = self.progress_text,
        )
    }
}

/// Structured record read from the backend reply. Every key is required and
/// non-null; empty lists and empty strings are valid answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalAssist {
    #[serde(alias = "diagnostico_diferencial")]
    pub differential_diagnosis: Vec<String>,
    #[serde(alias = "manejo_sugerido")]
    pub suggested_management: String,
    #[serde(alias = "proxima_accion")]
    pub next_action: String,
    #[serde(alias = "alertas")]
    pub alerts: Vec<String>,
}

/// Raw reply plus its parsed record, `None` when parsing failed.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub raw: String,
    pub parsed: Option<ClinicalAssist>,
    parse_error: Option<String>,
}

impl GenerationResult {
    /// `raw` is the backend reply as received; reasoning blocks are stripped
    /// only for parsing.
    pub fn from_reply(raw: String) -> Self {
        match parse_assist_response(&sanitize_llm_output(&raw)) {
            Ok(parsed) => Self {
                raw,
                parsed: Some(parsed),
                parse_error: None,
            },
            Err(e) => {
                let reason = match e {
                    AssistError::MalformedResponse { reason, .. } => reason,
                    other => other.to_string(),
                };
                Self {
                    raw,
                    parsed: None,
                    parse_error: Some(reason),
                }
            }
        }
    }

    pub fn into_parsed(self) -> Result<ClinicalAssist, AssistError> {
        match self.parsed {
            Some(parsed) => Ok(parsed),
            None => Err(AssistError::MalformedResponse {
                reason: self.parse_error.unwrap_or_else(|| "no payload".into()),
                raw: self.raw,
            }),
        }
    }
}

/// The four derived columns in stored form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRecord {
    pub differential_diagnosis: String,
    pub suggested_management: String,
    pub next_action: String,
    pub alerts: String,
}

impl From<&ClinicalAssist> for DerivedRecord {
    fn from(assist: &ClinicalAssist) -> Self {
        Self {
            differential_diagnosis: join_lines(&assist.differential_diagnosis),
            suggested_management: assist.suggested_management.clone(),
            next_action: assist.next_action.clone(),
            alerts: join_lines(&assist.alerts),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    BackendFailure,
    MalformedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Closed before the trigger started or while the call was in flight.
    CaseClosed,
}

/// What one trigger did to one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Derived fields committed. `status` is `stale` when a newer trigger raced this one.
    Updated {
        updated_at: DateTime<Utc>,
        status: DerivedStatus,
    },
    /// Backend or parse failure; derived fields left as they were.
    Warning { kind: WarningKind, message: String },
    Skipped { reason: SkipReason },
    /// The derived-state write itself failed.
    Failed { message: String },
}

impl SyncOutcome {
    /// Whether the end user should be told suggestions are unavailable.
    pub fn needs_notice(&self) -> bool {
        matches!(self, Self::Warning { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub case_id: Uuid,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}
