//! Coordinator configuration
//!
//! Layered in order: built-in defaults, an optional YAML file, then
//! `MINDNOTE_*` environment variables. The binary applies its flags last.

use crate::llm::{Provider, DEFAULT_PARAGRAPH_LIMIT};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_OPENAI_KEY: &str = "MINDNOTE_OPENAI_API_KEY";
pub const ENV_ANTHROPIC_KEY: &str = "MINDNOTE_ANTHROPIC_API_KEY";
pub const ENV_PROVIDER: &str = "MINDNOTE_PROVIDER";
pub const ENV_TRANSCRIPT_ENDPOINT: &str = "MINDNOTE_TRANSCRIPT_ENDPOINT";
pub const ENV_DB: &str = "MINDNOTE_DB";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// Settings for the coordinator and its remote collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// SQLite file backing the session; `None` means the platform data dir.
    pub db_path: Option<PathBuf>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub preferred_provider: Option<Provider>,
    pub openai_model: String,
    pub anthropic_model: String,
    /// Transcript service URL; without one every transcript fetch fails.
    pub transcript_endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub summary_paragraph_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            openai_api_key: None,
            anthropic_api_key: None,
            preferred_provider: None,
            openai_model: "gpt-4o".to_string(),
            anthropic_model: "claude-3-opus-20240229".to_string(),
            transcript_endpoint: None,
            request_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            summary_paragraph_limit: DEFAULT_PARAGRAPH_LIMIT,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.with_env_from(|name| std::env::var(name).ok())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Overlay non-empty variables returned by `lookup`.
    pub fn with_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_OPENAI_KEY) {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = get(ENV_ANTHROPIC_KEY) {
            self.anthropic_api_key = Some(key);
        }
        if let Some(raw) = get(ENV_PROVIDER) {
            let provider = raw.parse().map_err(|message| ConfigError::InvalidValue {
                name: ENV_PROVIDER,
                message,
            })?;
            self.preferred_provider = Some(provider);
        }
        if let Some(endpoint) = get(ENV_TRANSCRIPT_ENDPOINT) {
            self.transcript_endpoint = Some(endpoint);
        }
        if let Some(db) = get(ENV_DB) {
            self.db_path = Some(PathBuf::from(db));
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms))
    }

    /// The configured database path, or `<data dir>/mindnote/session.db`.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("mindnote").join("session.db")
}
