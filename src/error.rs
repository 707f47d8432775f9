//! Error types for the survey service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the answer-adequacy oracle.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Judge call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Judge returned an unparseable verdict: {raw:?}")]
    UnparseableVerdict { raw: String },
}

/// Errors surfaced by a single survey turn.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    /// Client-supplied state could not be coerced to valid types.
    #[error("Malformed {which}: {reason}")]
    MalformedState { which: &'static str, reason: String },

    /// The judge failed; the turn did not mutate any state.
    #[error("Oracle failure: {0}")]
    Oracle(#[from] JudgeError),
}

impl SurveyError {
    pub fn malformed(which: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedState {
            which,
            reason: reason.into(),
        }
    }
}
