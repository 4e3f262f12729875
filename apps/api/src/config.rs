use anyhow::{bail, Context, Result};

use crate::evaluation::pipeline::EvaluationMode;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    /// Hugging Face token for the toxicity classifier. Toxicity scoring is off when unset.
    pub hf_api_token: Option<String>,
    pub toxicity_model: String,
    pub max_upload_bytes: usize,
    pub default_mode: EvaluationMode,
    pub port: u16,
    pub rust_log: String,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024;
pub const DEFAULT_TOXICITY_MODEL: &str = "unitary/toxic-bert";

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| crate::llm_client::DEFAULT_MODEL.to_string()),
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 120)?,
            hf_api_token: std::env::var("HF_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            toxicity_model: std::env::var("TOXICITY_MODEL")
                .unwrap_or_else(|_| DEFAULT_TOXICITY_MODEL.to_string()),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            default_mode: match std::env::var("EVALUATION_MODE") {
                Ok(raw) => parse_mode(&raw)?,
                Err(_) => EvaluationMode::Structured,
            },
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

#[cfg(test)]
impl Config {
    /// Fixed configuration for router and handler tests: 1 KiB uploads, structured mode.
    pub fn for_tests() -> Self {
        Config {
            anthropic_api_key: "test".to_string(),
            llm_model: "test-model".to_string(),
            llm_timeout_secs: 5,
            hf_api_token: None,
            toxicity_model: DEFAULT_TOXICITY_MODEL.to_string(),
            max_upload_bytes: 1024,
            default_mode: EvaluationMode::Structured,
            port: 0,
            rust_log: "info".to_string(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_mode(raw: &str) -> Result<EvaluationMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "structured" => Ok(EvaluationMode::Structured),
        "sectioned" => Ok(EvaluationMode::Sectioned),
        other => bail!("EVALUATION_MODE must be 'structured' or 'sectioned', got '{other}'"),
    }
}
