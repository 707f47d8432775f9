//! Multi-theme conversational survey.
//!
//! A survey is an ordered list of themes, each an ordered list of questions.
//! The user is asked one question at a time; an [`AnswerJudge`] decides
//! whether each reply answers it, and the [`TurnEngine`] advances through
//! questions and themes. All state round-trips through the client.

pub mod conversation;
pub mod definition;
pub mod engine;
pub mod judge;
pub mod session;
pub mod theme;

pub use conversation::ConversationState;
pub use definition::{SurveyDefinition, ThemeDefinition};
pub use engine::{SurveyPhase, TurnDecision, TurnEngine, TurnOutcome};
pub use judge::{AnswerJudge, LlmJudge, parse_verdict};
pub use session::SurveySession;
pub use theme::ThemeState;
