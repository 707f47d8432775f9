//! Configuration types.
//!
//! Everything here is read once at startup and handed to the components that
//! need it; nothing is kept in globals.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::survey::SurveyDefinition;

/// Default judge prompt. `{question}` and `{message}` are substituted per call.
pub const DEFAULT_JUDGE_PROMPT: &str = "\
Does the following message answer the question?
Question: {question}
Message: {message}
Respond with only 'true' or 'false'. If it only partially answers the question, reply with 'true'.";

/// Turn engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Appended to every accepted answer before it is stored.
    pub answer_terminator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            answer_terminator: ".".to_string(),
        }
    }
}

/// Answer judge settings.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub prompt_template: String,
    /// The verdict is a single word.
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_JUDGE_PROMPT.to_string(),
            max_tokens: 5,
            temperature: 0.0,
        }
    }
}

impl JudgeConfig {
    /// `SURVEY_JUDGE_PROMPT_PATH` overrides the built-in prompt.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("SURVEY_JUDGE_PROMPT_PATH") {
            let template = std::fs::read_to_string(&path)?;
            if !template.contains("{question}") || !template.contains("{message}") {
                return Err(ConfigError::InvalidValue {
                    key: "SURVEY_JUDGE_PROMPT_PATH".to_string(),
                    message: "template must contain {question} and {message}".to_string(),
                });
            }
            config.prompt_template = template;
        }
        Ok(config)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("SURVEY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        Self { port }
    }
}

/// How the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Server,
    Cli,
}

impl RunMode {
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("SURVEY_MODE").as_deref() {
            Err(_) | Ok("server") | Ok("") => Ok(Self::Server),
            Ok("cli") => Ok(Self::Cli),
            Ok(other) => Err(ConfigError::InvalidValue {
                key: "SURVEY_MODE".to_string(),
                message: format!("expected 'server' or 'cli', got {other:?}"),
            }),
        }
    }
}

/// Everything the binary needs, loaded once.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub judge: JudgeConfig,
    pub engine: EngineConfig,
    pub survey: SurveyDefinition,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let survey = match std::env::var("SURVEY_DEFINITION_PATH") {
            Ok(path) => SurveyDefinition::from_file(&PathBuf::from(path))?,
            Err(_) => SurveyDefinition::default(),
        };

        let engine = EngineConfig {
            answer_terminator: std::env::var("SURVEY_ANSWER_TERMINATOR")
                .unwrap_or_else(|_| EngineConfig::default().answer_terminator),
        };

        Ok(Self {
            mode: RunMode::from_env()?,
            server: ServerConfig::from_env(),
            llm: LlmConfig::from_env()?,
            judge: JudgeConfig::from_env()?,
            engine,
            survey,
        })
    }
}
