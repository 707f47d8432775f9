//! Cross-theme progression state.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::conversation::{ConversationState, RawConversationState, coerce_index, coerce_keyed_map};
use super::definition::SurveyDefinition;
use crate::error::SurveyError;

/// Which theme is active, which themes are finished, and an archive of each
/// finished theme's conversation.
///
/// Out-of-range indices never fail: accessors return empty values, since a
/// survey that ran off its last theme is a legitimate terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThemeState")]
pub struct ThemeState {
    pub themes: Vec<String>,
    pub theme_questions: Vec<Vec<String>>,
    pub current_theme_index: usize,
    pub themes_addressed: BTreeMap<usize, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conversations: BTreeMap<usize, ConversationState>,
}

impl ThemeState {
    pub fn new(themes: Vec<String>, theme_questions: Vec<Vec<String>>) -> Self {
        Self {
            themes,
            theme_questions,
            current_theme_index: 0,
            themes_addressed: BTreeMap::new(),
            conversations: BTreeMap::new(),
        }
    }

    pub fn from_definition(definition: &SurveyDefinition) -> Self {
        Self::new(definition.labels(), definition.question_lists())
    }

    /// Rehydrate from an untrusted JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SurveyError> {
        let raw: RawThemeState = serde_json::from_value(value)
            .map_err(|e| SurveyError::malformed("theme_state", e.to_string()))?;
        Self::try_from(raw)
    }

    /// Label of the active theme, or `""` past the end.
    pub fn current_theme_label(&self) -> &str {
        self.themes
            .get(self.current_theme_index)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Questions of the active theme, or an empty slice past the end.
    pub fn current_theme_questions(&self) -> &[String] {
        self.theme_questions
            .get(self.current_theme_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_more_themes(&self) -> bool {
        self.current_theme_index < self.themes.len().saturating_sub(1)
    }

    /// Record the active theme as finished. Idempotent; no-op past the end.
    pub fn mark_current_theme_addressed(&mut self) -> bool {
        let Some(label) = self.themes.get(self.current_theme_index) else {
            return false;
        };
        if self.themes_addressed.contains_key(&self.current_theme_index) {
            return false;
        }
        self.themes_addressed
            .insert(self.current_theme_index, label.clone());
        true
    }

    /// Move to the next theme. Callers check `has_more_themes()` first.
    pub fn advance_theme(&mut self) {
        self.current_theme_index = self.current_theme_index.saturating_add(1);
    }

    /// Every theme has been addressed and there is nowhere left to go.
    pub fn is_survey_complete(&self) -> bool {
        !self.has_more_themes()
            && (0..self.themes.len()).all(|i| self.themes_addressed.contains_key(&i))
    }

    pub fn archived_conversation(&self, theme_index: usize) -> Option<&ConversationState> {
        self.conversations.get(&theme_index)
    }

    pub fn archive_conversation(&mut self, theme_index: usize, conversation: ConversationState) {
        self.conversations.insert(theme_index, conversation);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawThemeState {
    themes: Option<Vec<Option<String>>>,
    theme_questions: Option<Vec<Option<Vec<Option<String>>>>>,
    current_theme_index: Option<serde_json::Value>,
    themes_addressed: Option<HashMap<String, Option<String>>>,
    conversations: Option<HashMap<String, Option<RawConversationState>>>,
}

impl TryFrom<RawThemeState> for ThemeState {
    type Error = SurveyError;

    fn try_from(raw: RawThemeState) -> Result<Self, Self::Error> {
        let themes: Vec<String> = raw
            .themes
            .unwrap_or_default()
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let theme_questions: Vec<Vec<String>> = raw
            .theme_questions
            .unwrap_or_default()
            .into_iter()
            .map(|list| {
                list.unwrap_or_default()
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect()
            })
            .collect();

        if themes.len() != theme_questions.len() {
            return Err(SurveyError::malformed(
                "theme_state",
                format!(
                    "{} themes but {} question lists",
                    themes.len(),
                    theme_questions.len()
                ),
            ));
        }

        if let Some(empty) = theme_questions.iter().position(Vec::is_empty) {
            return Err(SurveyError::malformed(
                "theme_state",
                format!("theme {empty} has no questions"),
            ));
        }

        let current_theme_index = match raw.current_theme_index {
            None | Some(serde_json::Value::Null) => 0,
            Some(v) => coerce_index(&v).ok_or_else(|| {
                SurveyError::malformed(
                    "theme_state",
                    format!("current_theme_index must be a non-negative integer, got {v}"),
                )
            })?,
        };
        // One past the last theme is the terminal position.
        let current_theme_index = if current_theme_index > themes.len() {
            warn!(
                current_theme_index,
                themes = themes.len(),
                "Clamping current_theme_index to the end of the survey"
            );
            themes.len()
        } else {
            current_theme_index
        };

        let themes_addressed =
            coerce_keyed_map(raw.themes_addressed.unwrap_or_default(), "themes_addressed")
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect();

        let mut conversations = BTreeMap::new();
        for (k, v) in coerce_keyed_map(raw.conversations.unwrap_or_default(), "conversations") {
            if let Some(raw_conversation) = v {
                conversations.insert(k, ConversationState::try_from(raw_conversation)?);
            }
        }

        Ok(Self {
            themes,
            theme_questions,
            current_theme_index,
            themes_addressed,
            conversations,
        })
    }
}
