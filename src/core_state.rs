//! Process-wide application state shared by every request handler.
//!
//! Built once in `main` and wrapped in `Arc`. Holds no open connection:
//! handlers call [`CoreState::open_db`] inside `spawn_blocking` and drop the
//! connection when done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::AppConfig;
use crate::db;
use crate::pipeline::assist::{AssistSync, SqliteCaseStore};
use crate::pipeline::llm::{ChatCompletionClient, LlmClient, LlmError};

pub struct CoreState {
    db_path: PathBuf,
    llm: Arc<dyn LlmClient>,
    assist: AssistSync,
    started_at: Instant,
}

impl CoreState {
    /// State backed by the configured chat-completion backend.
    ///
    /// Must be called outside the async runtime: the blocking HTTP client
    /// owns its own runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let client = ChatCompletionClient::new(
            &config.llm.api_base,
            config.llm.api_key.as_deref(),
            &config.llm.model,
            config.llm.timeout_secs,
        )?;
        if !client.has_api_key() {
            tracing::warn!("No generation API key configured; clinical suggestions will be unavailable");
        }
        Ok(Self::new(&config.db_path, Arc::new(client)))
    }

    pub fn new(db_path: &Path, llm: Arc<dyn LlmClient>) -> Self {
        let assist = AssistSync::new(llm.clone(), Box::new(SqliteCaseStore::new()));
        Self {
            db_path: db_path.to_path_buf(),
            llm,
            assist,
            started_at: Instant::now(),
        }
    }

    /// Open a fresh connection. Migrations run on first open.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    pub fn assist(&self) -> &AssistSync {
        &self.assist
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Generation client error: {0}")]
    Llm(#[from] LlmError),
}
