use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DerivedStatus;

/// Default synopsis length shown in the active-case listing.
pub const SYNOPSIS_LEN: usize = 150;

/// One episode of urgent-care treatment ("atención"). Open until closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub active: bool,
    /// Free-text progress note ("detalle").
    pub progress_note: Option<String>,
    pub final_report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub derived: DerivedClinicalState,
}

impl Case {
    pub fn open(patient_id: Uuid, progress_note: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            active: true,
            progress_note,
            final_report: None,
            created_at: Utc::now(),
            closed_at: None,
            derived: DerivedClinicalState::default(),
        }
    }

    pub fn progress_text(&self) -> &str {
        self.progress_note.as_deref().unwrap_or("")
    }

    /// Time elapsed since the case was opened, as `HH:MM`.
    pub fn elapsed_hhmm(&self, now: DateTime<Utc>) -> String {
        let minutes = (now - self.created_at).num_minutes().max(0);
        format!("{:02}:{:02}", minutes / 60, minutes % 60)
    }

    /// First `len` characters of the progress note, `"Sin detalle"` when empty.
    pub fn synopsis(&self, len: usize) -> String {
        let note = self.progress_text();
        if note.is_empty() {
            return "Sin detalle".to_string();
        }
        if note.chars().count() > len {
            let head: String = note.chars().take(len).collect();
            format!("{head}...")
        } else {
            note.to_string()
        }
    }
}

/// AI-derived fields attached to a case. Written only by the derived-state committer.
///
/// List-valued fields are stored newline-joined; use [`split_lines`] to read them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedClinicalState {
    pub differential_diagnosis: String,
    pub suggested_management: String,
    pub next_action: String,
    pub alerts: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: DerivedStatus,
}

impl Default for DerivedClinicalState {
    fn default() -> Self {
        Self {
            differential_diagnosis: String::new(),
            suggested_management: String::new(),
            next_action: String::new(),
            alerts: String::new(),
            updated_at: None,
            status: DerivedStatus::Empty,
        }
    }
}

impl DerivedClinicalState {
    pub fn diagnoses(&self) -> Vec<String> {
        split_lines(&self.differential_diagnosis)
    }

    pub fn alert_list(&self) -> Vec<String> {
        split_lines(&self.alerts)
    }

    /// Fields only; ignores timestamp and status.
    pub fn same_fields(&self, other: &DerivedClinicalState) -> bool {
        self.differential_diagnosis == other.differential_diagnosis
            && self.suggested_management == other.suggested_management
            && self.next_action == other.next_action
            && self.alerts == other.alerts
    }
}

/// Join list items into the stored newline-separated form.
///
/// Embedded newlines inside an item become spaces so the item count survives a read back.
pub fn join_lines(items: &[String]) -> String {
    items
        .iter()
        .map(|item| item.replace("\r\n", " ").replace('\n', " "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`join_lines`]. Empty text is an empty list.
pub fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(str::to_string).collect()
}
