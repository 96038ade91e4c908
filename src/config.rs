//! Panel configuration: JSON file, then environment overrides.
//!
//! ## Environment variables
//! - `OLLAMA_HOST` - backend base URL (default: `http://localhost:11434`)
//! - `PANEL_MODEL` - judge model (default: `llama3.1:8b-instruct-q4_K_M`)
//! - `OLLAMA_TIMEOUT_SECONDS` - per-call timeout (default: 300)
//! - `PANEL_MIN_REQUEST_INTERVAL_MS` - spacing between backend calls (default: 0)
//! - `PANEL_ENABLE_CACHE` - `true`/`false` (default: true)
//! - `PANEL_CACHE_PATH` - SQLite cache file (default: `.panel_eval_cache.sqlite`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregator, AggregatorError, DEFAULT_WEIGHTS};
use crate::cache::{CACHE_PATH_ENV, DEFAULT_CACHE_PATH};
use crate::gateway::ollama::DEFAULT_OLLAMA_HOST;
use crate::gateway::GatewayConfig;
use crate::judge::JudgeSettings;
use crate::rubric::PerJudge;
use crate::text_budget::ContentBudget;

pub const DEFAULT_MODEL: &str = "llama3.1:8b-instruct-q4_K_M";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Weights(#[from] AggregatorError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub min_request_interval_ms: u64,
    /// Transport-level retries for retryable backend errors.
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 300,
            max_concurrent_requests: 1,
            min_request_interval_ms: 0,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgingConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub problem_token_budget: usize,
    pub content_token_budget: usize,
    pub visual_char_limit: usize,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        let budget = ContentBudget::default();
        let settings = JudgeSettings::default();
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            problem_token_budget: budget.problem_tokens,
            content_token_budget: budget.content_tokens,
            visual_char_limit: budget.visual_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_CACHE_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub backend: BackendConfig,
    pub judging: JudgingConfig,
    pub weights: PerJudge<f64>,
    pub cache: CacheConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            judging: JudgingConfig::default(),
            weights: DEFAULT_WEIGHTS,
            cache: CacheConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Defaults, the optional JSON file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("OLLAMA_HOST").filter(|s| !s.trim().is_empty()) {
            self.backend.base_url = url;
        }
        if let Some(model) = lookup("PANEL_MODEL").filter(|s| !s.trim().is_empty()) {
            self.backend.model = model;
        }
        if let Some(secs) = parse_var(&lookup, "OLLAMA_TIMEOUT_SECONDS")? {
            self.backend.timeout_secs = secs;
        }
        if let Some(ms) = parse_var(&lookup, "PANEL_MIN_REQUEST_INTERVAL_MS")? {
            self.backend.min_request_interval_ms = ms;
        }
        if let Some(raw) = lookup("PANEL_ENABLE_CACHE") {
            self.cache.enabled = parse_bool("PANEL_ENABLE_CACHE", &raw)?;
        }
        if let Some(path) = lookup(CACHE_PATH_ENV).filter(|s| !s.trim().is_empty()) {
            self.cache.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("backend.base_url is empty".into()));
        }
        if self.backend.model.trim().is_empty() {
            return Err(ConfigError::Validation("backend.model is empty".into()));
        }
        if self.backend.max_concurrent_requests == 0 {
            return Err(ConfigError::Validation(
                "backend.max_concurrent_requests must be at least 1".into(),
            ));
        }
        if self.judging.max_tokens == 0 {
            return Err(ConfigError::Validation("judging.max_tokens must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.judging.temperature) {
            return Err(ConfigError::Validation(format!(
                "judging.temperature must be within [0, 2], got {}",
                self.judging.temperature
            )));
        }
        Aggregator::new(self.weights)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_retries: self.backend.max_retries,
            max_concurrent_requests: self.backend.max_concurrent_requests,
            min_request_interval: Duration::from_millis(self.backend.min_request_interval_ms),
            ..GatewayConfig::default()
        }
    }

    pub fn judge_settings(&self) -> JudgeSettings {
        JudgeSettings {
            max_tokens: self.judging.max_tokens,
            temperature: self.judging.temperature,
            budget: ContentBudget {
                problem_tokens: self.judging.problem_token_budget,
                content_tokens: self.judging.content_token_budget,
                visual_chars: self.judging.visual_char_limit,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
