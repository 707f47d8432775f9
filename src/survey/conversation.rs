//! Per-theme conversation state: position in the question list and the
//! answers accepted so far.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SurveyError;

/// Progress through one theme's ordered question list.
///
/// Rehydrated from client-supplied JSON on every turn. Missing fields take
/// defaults, answer keys arrive as strings and are coerced to indices, and
/// keys that are not valid indices are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConversationState")]
pub struct ConversationState {
    pub questions: Vec<String>,
    pub current_index: usize,
    pub answers: BTreeMap<usize, String>,
    pub awaiting_answer: bool,
    pub did_answer: bool,
}

impl ConversationState {
    /// A fresh conversation over `questions`, expecting an answer to the first one.
    pub fn new(questions: Vec<String>) -> Self {
        Self {
            questions,
            current_index: 0,
            answers: BTreeMap::new(),
            awaiting_answer: true,
            did_answer: false,
        }
    }

    /// Rehydrate from an untrusted JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SurveyError> {
        let raw: RawConversationState = serde_json::from_value(value)
            .map_err(|e| SurveyError::malformed("conversation_state", e.to_string()))?;
        Self::try_from(raw)
    }

    /// Every question has an accepted answer.
    pub fn complete(&self) -> bool {
        self.current_index >= self.questions.len()
    }

    /// The question the next inbound message is judged against.
    pub fn current_question(&self) -> Option<&str> {
        self.questions.get(self.current_index).map(String::as_str)
    }

    /// Questions after the current one.
    pub fn remaining_questions(&self) -> &[String] {
        self.questions
            .get(self.current_index + 1..)
            .unwrap_or_default()
    }

    /// Accepted answers paired with their questions, in question order.
    pub fn answered(&self) -> Vec<(String, String)> {
        self.answers
            .iter()
            .filter_map(|(&i, a)| self.questions.get(i).map(|q| (q.clone(), a.clone())))
            .collect()
    }

    /// Record an accepted answer for the current question and move past it.
    ///
    /// Returns `false` without touching anything if the conversation is
    /// complete or the current index already holds an answer.
    pub(crate) fn accept_answer(&mut self, answer: String) -> bool {
        if self.complete() || self.answers.contains_key(&self.current_index) {
            return false;
        }
        self.answers.insert(self.current_index, answer);
        self.current_index += 1;
        true
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Wire shape accepted from clients before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawConversationState {
    questions: Option<Vec<Option<String>>>,
    current_index: Option<serde_json::Value>,
    answers: Option<HashMap<String, Option<String>>>,
    awaiting_answer: Option<bool>,
    did_answer: Option<bool>,
}

impl TryFrom<RawConversationState> for ConversationState {
    type Error = SurveyError;

    fn try_from(raw: RawConversationState) -> Result<Self, Self::Error> {
        let questions: Vec<String> = raw
            .questions
            .unwrap_or_default()
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();

        let requested_index = match raw.current_index {
            None | Some(serde_json::Value::Null) => 0,
            Some(v) => coerce_index(&v).ok_or_else(|| {
                SurveyError::malformed(
                    "conversation_state",
                    format!("current_index must be a non-negative integer, got {v}"),
                )
            })?,
        };
        let current_index = requested_index.min(questions.len());
        if current_index != requested_index {
            warn!(
                requested = requested_index,
                clamped = current_index,
                "current_index past end of question list"
            );
        }

        let answers = coerce_keyed_map(raw.answers.unwrap_or_default(), "answers")
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .filter(|(k, _)| *k < current_index)
            .collect::<BTreeMap<_, _>>();

        let awaiting_answer = raw.awaiting_answer.unwrap_or(answers.is_empty());

        Ok(Self {
            questions,
            current_index,
            answers,
            awaiting_answer,
            did_answer: raw.did_answer.unwrap_or(false),
        })
    }
}

/// Accept a JSON integer or a numeric string as an index.
pub(crate) fn coerce_index(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Convert a string-keyed map into an index-keyed one, dropping bad keys.
pub(crate) fn coerce_keyed_map<V>(raw: HashMap<String, V>, field: &str) -> BTreeMap<usize, V> {
    raw.into_iter()
        .filter_map(|(k, v)| match k.trim().parse::<usize>() {
            Ok(i) => Some((i, v)),
            Err(_) => {
                warn!(field = field, key = %k, "Dropping non-integer key");
                None
            }
        })
        .collect()
}
