//! Rebuilding a turn's state pair from whatever the client sent back.

use serde_json::Value;

use super::conversation::ConversationState;
use super::definition::SurveyDefinition;
use super::theme::ThemeState;
use crate::error::SurveyError;

/// The state pair for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveySession {
    pub themes: ThemeState,
    pub conversation: ConversationState,
}

impl SurveySession {
    /// A brand-new session at the first question of the first theme.
    pub fn start(definition: &SurveyDefinition) -> Self {
        let themes = ThemeState::from_definition(definition);
        let conversation = ConversationState::new(themes.current_theme_questions().to_vec());
        Self {
            themes,
            conversation,
        }
    }

    /// Resume from client-supplied state.
    ///
    /// Either value may be absent, `null`, a JSON object, or a JSON-encoded
    /// string. A theme state with no themes is seeded from `definition`; a
    /// conversation with no questions is seeded from the current theme.
    pub fn resume(
        definition: &SurveyDefinition,
        theme_state: Option<Value>,
        conversation_state: Option<Value>,
    ) -> Result<Self, SurveyError> {
        let themes = match unwrap_encoded(theme_state, "theme_state")? {
            Some(value) => ThemeState::from_value(value)?,
            None => ThemeState::from_definition(definition),
        };
        let themes = if themes.themes.is_empty() {
            ThemeState::from_definition(definition)
        } else {
            themes
        };

        let conversation = match unwrap_encoded(conversation_state, "conversation_state")? {
            Some(value) => ConversationState::from_value(value)?,
            None => ConversationState::default(),
        };
        let conversation = if conversation.questions.is_empty() {
            ConversationState::new(themes.current_theme_questions().to_vec())
        } else {
            conversation
        };

        Ok(Self {
            themes,
            conversation,
        })
    }

    pub fn to_json(&self) -> (Value, Value) {
        (
            serde_json::to_value(&self.themes).unwrap_or(Value::Null),
            serde_json::to_value(&self.conversation).unwrap_or(Value::Null),
        )
    }
}

/// Collapse `null` to `None` and decode a stringified JSON payload.
fn unwrap_encoded(value: Option<Value>, which: &'static str) -> Result<Option<Value>, SurveyError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            let decoded: Value = serde_json::from_str(&s)
                .map_err(|e| SurveyError::malformed(which, format!("invalid JSON string: {e}")))?;
            match decoded {
                Value::Null => Ok(None),
                other => Ok(Some(other)),
            }
        }
        Some(other) => Ok(Some(other)),
    }
}
