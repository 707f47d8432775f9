//! Survey definitions: the fixed, ordered themes and their questions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One theme and its ordered questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDefinition {
    pub label: String,
    pub questions: Vec<String>,
}

/// The full survey, immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyDefinition {
    pub themes: Vec<ThemeDefinition>,
}

impl SurveyDefinition {
    pub fn new(themes: Vec<ThemeDefinition>) -> Result<Self, ConfigError> {
        let definition = Self { themes };
        definition.validate()?;
        Ok(definition)
    }

    /// Load and validate a JSON definition file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let definition: Self = serde_json::from_str(&text)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn labels(&self) -> Vec<String> {
        self.themes.iter().map(|t| t.label.clone()).collect()
    }

    pub fn question_lists(&self) -> Vec<Vec<String>> {
        self.themes.iter().map(|t| t.questions.clone()).collect()
    }

    pub fn question_count(&self) -> usize {
        self.themes.iter().map(|t| t.questions.len()).sum()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.themes.is_empty() {
            return Err(invalid("survey definition has no themes"));
        }
        for (i, theme) in self.themes.iter().enumerate() {
            if theme.label.trim().is_empty() {
                return Err(invalid(format!("theme {i} has an empty label")));
            }
            if theme.questions.is_empty() {
                return Err(invalid(format!("theme {:?} has no questions", theme.label)));
            }
            if theme.questions.iter().any(|q| q.trim().is_empty()) {
                return Err(invalid(format!("theme {:?} has an empty question", theme.label)));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: "SURVEY_DEFINITION_PATH".to_string(),
        message: message.into(),
    }
}

impl Default for SurveyDefinition {
    /// Built-in burnout check-in.
    fn default() -> Self {
        let theme = |label: &str, questions: &[&str]| ThemeDefinition {
            label: label.to_string(),
            questions: questions.iter().map(|q| q.to_string()).collect(),
        };
        Self {
            themes: vec![
                theme(
                    "exhaustion",
                    &[
                        "Tell me about the last time you felt completely wiped out. What was happening that day?",
                        "When you hit that wiped-out feeling, what drains fastest: your patience with people, your physical energy, or your ability to think clearly?",
                    ],
                ),
                theme(
                    "detachment",
                    &["These days, what part of work makes you want to just check out or stop caring?"],
                ),
                theme(
                    "efficacy",
                    &["When you think about your actual skills and what you can do, not how you feel, how confident are you that you're still good at your work?"],
                ),
                theme(
                    "trajectory",
                    &["Looking back over the last few months, is this feeling getting better, staying the same, or getting worse?"],
                ),
            ],
        }
    }
}
