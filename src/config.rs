use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Urgentias";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_LLM_BASE: &str = "https://api.deepseek.com";
pub const DEFAULT_LLM_MODEL: &str = "deepseek-chat";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Cannot determine a data directory; set URGENTIAS_DB_PATH")]
    NoDataDir,
}

/// Settings resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let db_path = match get(&["URGENTIAS_DB_PATH"]) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let bind_raw = get(&["URGENTIAS_BIND"]).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                key: "URGENTIAS_BIND",
                value: bind_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let timeout_secs = match get(&["LLM_TIMEOUT_SECS"]) {
            None => DEFAULT_LLM_TIMEOUT_SECS,
            Some(raw) => parse_timeout(&raw)?,
        };

        Ok(Self {
            db_path,
            bind_addr,
            llm: LlmSettings {
                api_base: get(&["LLM_API_BASE", "DEEPSEEK_API_BASE"])
                    .unwrap_or_else(|| DEFAULT_LLM_BASE.to_string()),
                api_key: get(&["LLM_API_KEY", "DEEPSEEK_API_KEY", "OPENAI_API_KEY"]),
                model: get(&["LLM_MODEL", "DEEPSEEK_MODEL"])
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                timeout_secs,
            },
        })
    }
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: "LLM_TIMEOUT_SECS",
        value: raw.to_string(),
        reason,
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero".into())),
        Ok(secs) => Ok(secs),
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// `<data_dir>/urgentias/urgentias.db`
pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(base.join("urgentias").join("urgentias.db"))
}

/// Used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "urgentias=info,urgentias_lib=info,tower_http=info"
}
