use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chilean RUN: 6-8 digits, a dash, then a digit or K check character.
static RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6,8}-[\dkK]$").expect("valid regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub run: String,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Free-text clinical history. Shared context for every open case of the patient.
    pub history: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(run: &str, name: Option<String>, birth_date: Option<NaiveDate>, history: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run: run.trim().to_string(),
            name,
            birth_date,
            history,
            created_at: Utc::now(),
        }
    }

    pub fn is_valid_run(run: &str) -> bool {
        RUN_RE.is_match(run)
    }

    /// Age in whole years on `today`, `None` without a birth date.
    pub fn age_on(&self, today: NaiveDate) -> Option<i32> {
        let born = self.birth_date?;
        let mut age = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        Some(age)
    }

    pub fn history_text(&self) -> &str {
        self.history.as_deref().unwrap_or("")
    }
}
