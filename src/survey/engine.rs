//! Turn engine: the survey state machine.
//!
//! One call to [`TurnEngine::handle_turn`] consumes one user message, may
//! consult the [`AnswerJudge`], and mutates the theme and conversation state
//! passed in. Nothing is retained between calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::conversation::ConversationState;
use super::judge::AnswerJudge;
use super::theme::ThemeState;
use crate::config::EngineConfig;
use crate::error::SurveyError;

/// Where the survey stands, derived from the two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyPhase {
    AwaitingFirstMessage,
    AwaitingAnswer,
    ThemeComplete,
    SurveyComplete,
}

impl SurveyPhase {
    pub fn of(themes: &ThemeState, conversation: &ConversationState) -> Self {
        if conversation.complete() {
            let unaddressed = themes.current_theme_index < themes.themes.len()
                && !themes
                    .themes_addressed
                    .contains_key(&themes.current_theme_index);
            if themes.has_more_themes() || unaddressed {
                Self::ThemeComplete
            } else {
                Self::SurveyComplete
            }
        } else if themes.current_theme_index == 0
            && conversation.current_index == 0
            && conversation.answers.is_empty()
        {
            Self::AwaitingFirstMessage
        } else {
            Self::AwaitingAnswer
        }
    }
}

/// What should happen next, for the layer that talks to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDecision {
    /// The reply was judged inadequate; ask the same question again.
    AskSameQuestion,
    /// Ask the question now at `current_index`.
    AskNextQuestion,
    /// A theme was finished; ask the first question of the new theme.
    ThemeTransition,
    /// No theme or question remains.
    SurveyComplete,
}

impl std::fmt::Display for TurnDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AskSameQuestion => "ask_same_question",
            Self::AskNextQuestion => "ask_next_question",
            Self::ThemeTransition => "theme_transition",
            Self::SurveyComplete => "survey_complete",
        };
        write!(f, "{s}")
    }
}

/// Result of one turn: the decision plus the context needed to phrase it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub decision: TurnDecision,
    pub did_answer: bool,
    pub theme_label: String,
    pub current_question: Option<String>,
    pub remaining_questions: Vec<String>,
    /// Accepted (question, answer) pairs in the active theme.
    pub answered: Vec<(String, String)>,
}

/// Drives one theme/conversation pair through a single turn.
pub struct TurnEngine {
    judge: Arc<dyn AnswerJudge>,
    config: EngineConfig,
}

impl TurnEngine {
    pub fn new(judge: Arc<dyn AnswerJudge>, config: EngineConfig) -> Self {
        Self { judge, config }
    }

    /// Process one user message.
    ///
    /// On `Err` neither state has been modified: the judge is the only
    /// fallible step and it runs before any mutation.
    pub async fn handle_turn(
        &self,
        themes: &mut ThemeState,
        conversation: &mut ConversationState,
        user_message: &str,
    ) -> Result<TurnOutcome, SurveyError> {
        // A fresh state that never set the flag still expects an answer.
        let awaiting = conversation.awaiting_answer
            || (conversation.answers.is_empty() && conversation.current_index == 0);

        let evaluated = awaiting
            && !conversation.complete()
            && !conversation.answers.contains_key(&conversation.current_index);

        if evaluated {
            let question = conversation
                .current_question()
                .unwrap_or_default()
                .to_string();
            let adequate = self
                .judge
                .does_answer(&question, user_message)
                .await
                .inspect_err(|e| {
                    warn!(
                        error = %e,
                        theme = themes.current_theme_label(),
                        question_index = conversation.current_index,
                        "Answer judge failed"
                    );
                })?;

            let accepted = adequate
                && conversation.accept_answer(format!(
                    "{user_message}{}",
                    self.config.answer_terminator
                ));
            conversation.did_answer = accepted;
            debug!(
                adequate,
                question_index = conversation.current_index,
                "Evaluated reply"
            );
        } else {
            conversation.did_answer = false;
        }

        let mut transitioned = false;
        if conversation.complete() {
            let previous = themes.current_theme_index;
            let newly_addressed = themes.mark_current_theme_addressed();
            if newly_addressed {
                info!(theme = themes.current_theme_label(), index = previous, "Theme addressed");
            }

            if themes.has_more_themes() {
                themes.advance_theme();
                let next = ConversationState::new(themes.current_theme_questions().to_vec());
                let finished = std::mem::replace(conversation, next);
                themes.archive_conversation(previous, finished);
                transitioned = true;
                info!(
                    from = previous,
                    to = themes.current_theme_index,
                    theme = themes.current_theme_label(),
                    "Advanced to next theme"
                );
            } else if newly_addressed {
                themes.archive_conversation(previous, conversation.clone());
            }
        }

        conversation.awaiting_answer = !conversation.complete();

        let decision = if conversation.complete() && !themes.has_more_themes() {
            TurnDecision::SurveyComplete
        } else if transitioned {
            TurnDecision::ThemeTransition
        } else if evaluated && !conversation.did_answer {
            TurnDecision::AskSameQuestion
        } else {
            TurnDecision::AskNextQuestion
        };

        info!(
            %decision,
            theme = themes.current_theme_label(),
            question_index = conversation.current_index,
            did_answer = conversation.did_answer,
            "Turn handled"
        );

        Ok(TurnOutcome {
            decision,
            did_answer: conversation.did_answer,
            theme_label: themes.current_theme_label().to_string(),
            current_question: conversation.current_question().map(str::to_string),
            remaining_questions: conversation.remaining_questions().to_vec(),
            answered: conversation.answered(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::JudgeError;
    use crate::survey::{SurveyDefinition, SurveySession};

    /// Replays queued verdicts and records every (question, message) it saw.
    struct ScriptedJudge {
        verdicts: Mutex<VecDeque<Result<bool, ()>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedJudge {
        fn new(verdicts: impl IntoIterator<Item = bool>) -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(verdicts.into_iter().map(Ok).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(VecDeque::from([Err(())])),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AnswerJudge for ScriptedJudge {
        async fn does_answer(&self, question: &str, message: &str) -> Result<bool, JudgeError> {
            self.calls
                .lock()
                .unwrap()
                .push((question.to_string(), message.to_string()));
            match self.verdicts.lock().unwrap().pop_front() {
                Some(Ok(v)) => Ok(v),
                Some(Err(())) => Err(JudgeError::UnparseableVerdict {
                    raw: "maybe".to_string(),
                }),
                None => panic!("judge called more times than scripted"),
            }
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn survey(themes: &[(&str, &[&str])]) -> (ThemeState, ConversationState) {
        let state = ThemeState::new(
            themes.iter().map(|(l, _)| l.to_string()).collect(),
            themes.iter().map(|(_, q)| strings(q)).collect(),
        );
        let conversation = ConversationState::new(state.current_theme_questions().to_vec());
        (state, conversation)
    }

    fn engine(judge: Arc<ScriptedJudge>) -> TurnEngine {
        TurnEngine::new(judge, EngineConfig::default())
    }

    #[tokio::test]
    async fn adequate_answers_walk_one_theme() {
        let judge = ScriptedJudge::new([true, true]);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) = survey(&[("energy", &["Q1", "Q2"])]);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "tired").await.unwrap();
        assert_eq!(conv.current_index, 1);
        assert_eq!(outcome.decision, TurnDecision::AskNextQuestion);
        assert_eq!(outcome.current_question.as_deref(), Some("Q2"));
        assert!(conv.awaiting_answer);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "patience").await.unwrap();
        assert_eq!(conv.current_index, 2);
        assert!(conv.complete());
        assert!(!conv.awaiting_answer);
        assert!(conv.did_answer);
        assert_eq!(outcome.decision, TurnDecision::SurveyComplete);
        assert_eq!(themes.themes_addressed[&0], "energy");
        assert_eq!(conv.answers[&0], "tired.");
        assert_eq!(conv.answers[&1], "patience.");
        assert_eq!(
            *judge.calls.lock().unwrap(),
            vec![
                ("Q1".to_string(), "tired".to_string()),
                ("Q2".to_string(), "patience".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn inadequate_reply_reasks_same_question() {
        let judge = ScriptedJudge::new([false, false, true]);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) = survey(&[("energy", &["Q1", "Q2"])]);

        for _ in 0..2 {
            let outcome = engine.handle_turn(&mut themes, &mut conv, "I like turtles").await.unwrap();
            assert_eq!(outcome.decision, TurnDecision::AskSameQuestion);
            assert_eq!(conv.current_index, 0);
            assert!(conv.answers.is_empty());
            assert!(!conv.did_answer);
            assert!(conv.awaiting_answer, "flag must survive an inadequate reply");
            assert_eq!(themes.current_theme_index, 0);
        }

        engine.handle_turn(&mut themes, &mut conv, "a long day").await.unwrap();
        assert_eq!(conv.current_index, 1);
        assert_eq!(judge.call_count(), 3);
        assert!(judge.calls.lock().unwrap().iter().all(|(q, _)| q == "Q1"));
    }

    #[tokio::test]
    async fn two_themes_transition_then_complete() {
        let judge = ScriptedJudge::new([true, true]);
        let engine = engine(judge);
        let (mut themes, mut conv) = survey(&[("energy", &["E1"]), ("work", &["W1"])]);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "drained").await.unwrap();
        assert_eq!(outcome.decision, TurnDecision::ThemeTransition);
        assert_eq!(themes.current_theme_index, 1);
        assert_eq!(themes.themes_addressed.len(), 1);
        assert_eq!(themes.themes_addressed[&0], "energy");
        assert_eq!(conv.questions, vec!["W1"]);
        assert_eq!(conv.current_index, 0);
        assert!(conv.answers.is_empty());
        assert!(conv.awaiting_answer);
        assert!(!conv.did_answer);
        assert_eq!(outcome.theme_label, "work");
        assert_eq!(outcome.current_question.as_deref(), Some("W1"));

        let archived = themes.archived_conversation(0).unwrap();
        assert_eq!(archived.answers[&0], "drained.");
        assert!(archived.complete());

        let outcome = engine.handle_turn(&mut themes, &mut conv, "meetings").await.unwrap();
        assert_eq!(outcome.decision, TurnDecision::SurveyComplete);
        assert_eq!(themes.current_theme_index, 1);
        assert_eq!(themes.themes_addressed.len(), 2);
        assert!(themes.is_survey_complete());
        assert!(conv.complete());
        assert!(!conv.awaiting_answer);
        assert_eq!(themes.archived_conversation(1).unwrap().answers[&0], "meetings.");
        assert_eq!(SurveyPhase::of(&themes, &conv), SurveyPhase::SurveyComplete);
    }

    #[tokio::test]
    async fn completed_survey_never_consults_judge() {
        let judge = ScriptedJudge::new([true]);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) = survey(&[("energy", &["E1"])]);

        engine.handle_turn(&mut themes, &mut conv, "yes").await.unwrap();
        let snapshot = (themes.clone(), conv.clone());

        for _ in 0..3 {
            let outcome = engine.handle_turn(&mut themes, &mut conv, "anything else?").await.unwrap();
            assert_eq!(outcome.decision, TurnDecision::SurveyComplete);
            assert!(outcome.current_question.is_none());
        }
        assert_eq!(judge.call_count(), 1);
        assert_eq!(themes, snapshot.0);
        assert_eq!(conv.answers, snapshot.1.answers);
        assert_eq!(conv.current_index, snapshot.1.current_index);
    }

    #[tokio::test]
    async fn bootstrap_forces_awaiting_on_fresh_state() {
        let judge = ScriptedJudge::new([true]);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) = survey(&[("energy", &["Q1", "Q2"])]);
        conv.awaiting_answer = false;

        engine.handle_turn(&mut themes, &mut conv, "hello").await.unwrap();
        assert_eq!(judge.call_count(), 1);
        assert_eq!(conv.current_index, 1);
    }

    #[tokio::test]
    async fn resumed_state_without_flag_skips_evaluation_once() {
        let judge = ScriptedJudge::new([true]);
        let engine = engine(judge.clone());
        let (mut themes, _) = survey(&[("energy", &["Q1", "Q2", "Q3"])]);
        let mut conv = ConversationState::from_value(serde_json::json!({
            "questions": ["Q1", "Q2", "Q3"],
            "current_index": 1,
            "answers": {"0": "a."}
        }))
        .unwrap();
        assert!(!conv.awaiting_answer);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "hm").await.unwrap();
        assert_eq!(judge.call_count(), 0);
        assert_eq!(outcome.decision, TurnDecision::AskNextQuestion);
        assert_eq!(outcome.current_question.as_deref(), Some("Q2"));
        assert!(conv.awaiting_answer);

        engine.handle_turn(&mut themes, &mut conv, "b").await.unwrap();
        assert_eq!(judge.call_count(), 1);
        assert_eq!(conv.current_index, 2);
    }

    #[tokio::test]
    async fn existing_answer_at_current_index_is_never_overwritten() {
        let judge = ScriptedJudge::new([]);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) = survey(&[("energy", &["Q1", "Q2"])]);
        conv.answers.insert(0, "kept.".to_string());
        conv.awaiting_answer = true;

        let outcome = engine.handle_turn(&mut themes, &mut conv, "replacement").await.unwrap();
        assert_eq!(judge.call_count(), 0);
        assert_eq!(conv.answers[&0], "kept.");
        assert_eq!(conv.current_index, 0);
        assert_eq!(outcome.decision, TurnDecision::AskNextQuestion);
    }

    #[tokio::test]
    async fn judge_failure_is_an_error_and_leaves_state_untouched() {
        let judge = ScriptedJudge::failing();
        let engine = engine(judge);
        let (mut themes, mut conv) = survey(&[("energy", &["Q1"]), ("work", &["W1"])]);
        let before = (themes.clone(), conv.clone());

        let err = engine.handle_turn(&mut themes, &mut conv, "answer").await.unwrap_err();
        assert!(matches!(err, SurveyError::Oracle(_)));
        assert_eq!(themes, before.0);
        assert_eq!(conv, before.1);
    }

    #[tokio::test]
    async fn custom_terminator_applied() {
        let judge = ScriptedJudge::new([true]);
        let engine = TurnEngine::new(
            judge,
            EngineConfig {
                answer_terminator: "".to_string(),
            },
        );
        let (mut themes, mut conv) = survey(&[("energy", &["Q1", "Q2"])]);
        engine.handle_turn(&mut themes, &mut conv, "raw").await.unwrap();
        assert_eq!(conv.answers[&0], "raw");
    }

    #[tokio::test]
    async fn empty_theme_is_skipped_on_next_turn() {
        let judge = ScriptedJudge::new([true, true]);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) =
            survey(&[("energy", &["E1"]), ("empty", &[]), ("work", &["W1"])]);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "x").await.unwrap();
        assert_eq!(outcome.decision, TurnDecision::ThemeTransition);
        assert_eq!(themes.current_theme_index, 1);
        assert!(!conv.awaiting_answer);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "y").await.unwrap();
        assert_eq!(outcome.decision, TurnDecision::ThemeTransition);
        assert_eq!(themes.current_theme_index, 2);
        assert_eq!(judge.call_count(), 1);

        let outcome = engine.handle_turn(&mut themes, &mut conv, "z").await.unwrap();
        assert_eq!(outcome.decision, TurnDecision::SurveyComplete);
        assert_eq!(themes.themes_addressed.len(), 3);
    }

    #[tokio::test]
    async fn theme_index_past_the_end_completes_without_judging() {
        let definition = SurveyDefinition::default();
        for index in [serde_json::json!(5), serde_json::json!(u64::MAX)] {
            let judge = ScriptedJudge::new([]);
            let engine = engine(judge.clone());
            let mut session = SurveySession::resume(
                &definition,
                Some(serde_json::json!({
                    "themes": ["a", "b"],
                    "theme_questions": [["A"], ["B"]],
                    "current_theme_index": index
                })),
                None,
            )
            .unwrap();

            let outcome = engine
                .handle_turn(&mut session.themes, &mut session.conversation, "hi")
                .await
                .unwrap();
            assert_eq!(outcome.decision, TurnDecision::SurveyComplete);
            assert_eq!(outcome.theme_label, "");
            assert!(outcome.current_question.is_none());
            assert_eq!(session.themes.current_theme_index, 2);
            assert!(session.themes.themes_addressed.is_empty());
            assert_eq!(judge.call_count(), 0);
            assert_eq!(
                SurveyPhase::of(&session.themes, &session.conversation),
                SurveyPhase::SurveyComplete
            );
        }
    }

    #[tokio::test]
    async fn exhausting_every_theme_addresses_each_once() {
        let definition: &[(&str, &[&str])] = &[
            ("a", &["A1", "A2"]),
            ("b", &["B1"]),
            ("c", &["C1", "C2", "C3"]),
        ];
        // Alternate inadequate and adequate replies.
        let verdicts = (0..12).map(|i| i % 2 == 1);
        let judge = ScriptedJudge::new(verdicts);
        let engine = engine(judge.clone());
        let (mut themes, mut conv) = survey(definition);

        let mut last_index = (themes.current_theme_index, conv.current_index);
        let mut last_answers = 0;
        loop {
            let outcome = engine.handle_turn(&mut themes, &mut conv, "reply").await.unwrap();

            let index = (themes.current_theme_index, conv.current_index);
            if index.0 == last_index.0 {
                assert!(index.1 >= last_index.1, "current_index went backwards");
                assert!(conv.answers.len() >= last_answers, "answers lost entries");
            }
            last_index = index;
            last_answers = conv.answers.len();

            if outcome.decision == TurnDecision::SurveyComplete {
                break;
            }
        }

        assert_eq!(judge.call_count(), 12);
        assert_eq!(themes.current_theme_index, 2);
        assert!(conv.complete());
        assert_eq!(
            themes.themes_addressed.keys().copied().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        for (i, (_, questions)) in definition.iter().enumerate() {
            let archived = themes.archived_conversation(i).unwrap();
            assert_eq!(archived.answers.len(), questions.len());
        }
    }

    #[tokio::test]
    async fn states_roundtrip_between_turns() {
        let judge = ScriptedJudge::new([true, false, true, true]);
        let engine = engine(judge);
        let (mut themes, mut conv) = survey(&[("energy", &["E1", "E2"]), ("work", &["W1"])]);

        for message in ["one", "nope", "two", "three"] {
            engine.handle_turn(&mut themes, &mut conv, message).await.unwrap();

            let themes_json = serde_json::to_value(&themes).unwrap();
            let conv_json = serde_json::to_value(&conv).unwrap();
            themes = ThemeState::from_value(themes_json).unwrap();
            let rehydrated = ConversationState::from_value(conv_json).unwrap();
            assert_eq!(rehydrated, conv);
            conv = rehydrated;
        }
        assert!(themes.is_survey_complete());
    }

    #[test]
    fn phase_classification() {
        let (themes, conv) = survey(&[("energy", &["Q1"]), ("work", &["W1"])]);
        assert_eq!(SurveyPhase::of(&themes, &conv), SurveyPhase::AwaitingFirstMessage);

        let mut done = conv.clone();
        done.current_index = 1;
        assert_eq!(SurveyPhase::of(&themes, &done), SurveyPhase::ThemeComplete);

        let mut later = themes.clone();
        later.advance_theme();
        let fresh = ConversationState::new(strings(&["W1"]));
        assert_eq!(SurveyPhase::of(&later, &fresh), SurveyPhase::AwaitingAnswer);
    }

    #[test]
    fn decision_display_matches_serde() {
        for decision in [
            TurnDecision::AskSameQuestion,
            TurnDecision::AskNextQuestion,
            TurnDecision::ThemeTransition,
            TurnDecision::SurveyComplete,
        ] {
            let json = serde_json::to_string(&decision).unwrap();
            assert_eq!(format!("\"{decision}\""), json);
        }
    }
}
