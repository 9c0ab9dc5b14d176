//! Runtime settings read from the environment (and a `.env` file, if any).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::DEFAULT_MAX_TOOL_LOOPS;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_CHECKPOINT_DB: &str = "checkpoints.sqlite";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Needed to run the workflow; read-only commands work without it.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model_name: String,
    pub model_temperature: Option<f32>,
    pub tavily_api_key: Option<String>,
    pub max_tool_loops: u32,
    pub checkpoint_db: PathBuf,
    pub request_timeout: Duration,
    pub debug_mode: bool,
}

impl Config {
    /// Load `.env` (missing file is fine) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model_name: get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            model_temperature: parse("MODEL_TEMPERATURE", get("MODEL_TEMPERATURE"))?,
            tavily_api_key: get("TAVILY_API_KEY"),
            max_tool_loops: parse("MAX_TOOL_LOOPS", get("MAX_TOOL_LOOPS"))?
                .unwrap_or(DEFAULT_MAX_TOOL_LOOPS),
            checkpoint_db: get("CHECKPOINT_DB")
                .unwrap_or_else(|| DEFAULT_CHECKPOINT_DB.to_string())
                .into(),
            request_timeout: Duration::from_secs(
                parse("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"))?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            debug_mode: get("DEBUG_MODE").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| v.parse().map_err(|_| ConfigError::Invalid { key, value: v }))
        .transpose()
}
