//! LLM integration.
//!
//! The survey only needs plain chat completions against an OpenAI-compatible
//! endpoint; the `LlmProvider` trait keeps the judge independent of it.

pub mod openai;
pub mod provider;

pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::{ConfigError, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Read provider settings from the environment. `OPENAI_API_KEY` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let base_url =
            std::env::var("SURVEY_LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("SURVEY_JUDGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs: u64 = std::env::var("SURVEY_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            base_url,
            model,
            timeout_secs,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(config)?;
    tracing::info!("Using OpenAI-compatible endpoint (model: {})", config.model);
    Ok(Arc::new(provider))
}
