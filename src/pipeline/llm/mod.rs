//! Generation backend: the blocking client capability shared process-wide.

pub mod chat;
pub mod mock;
pub mod sanitize;

pub use chat::*;
pub use mock::*;
pub use sanitize::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation backend unreachable at {0}")]
    Connection(String),

    #[error("Generation request timed out after {0}s")]
    Timeout(u64),

    #[error("Generation backend returned error (status {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No API key configured for the generation backend")]
    MissingApiKey,
}

/// A single blocking, non-streaming text generation call.
///
/// Implementations must be cheap to share behind an `Arc`; one instance is
/// built at startup and reused for every request.
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError>;

    /// Model used when the caller has no preference.
    fn default_model(&self) -> &str;
}
