use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Generation backend failure: {0}")]
    Backend(#[from] LlmError),

    /// The reply arrived but no usable payload could be read from it.
    /// `raw` is kept for diagnostic logging only.
    #[error("Malformed generation response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    #[error("Derived-state persistence failed: {0}")]
    Persistence(#[from] DatabaseError),
}

impl AssistError {
    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    /// Backend and parse failures are recovered as warnings; persistence is not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}
