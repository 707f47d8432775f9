//! Answer-adequacy oracle.
//!
//! `AnswerJudge` is the only capability the turn engine needs from the
//! outside world. `LlmJudge` is the production implementation; tests use a
//! scripted fake behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Decides whether a reply adequately answers a question.
#[async_trait]
pub trait AnswerJudge: Send + Sync {
    /// `Ok(true)` if `message` answers `question`. Failures are errors, never
    /// an implicit `false`.
    async fn does_answer(&self, question: &str, message: &str) -> Result<bool, JudgeError>;
}

/// Asks a language model for a one-word verdict.
pub struct LlmJudge {
    llm: Arc<dyn LlmProvider>,
    config: JudgeConfig,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmProvider>, config: JudgeConfig) -> Self {
        Self { llm, config }
    }

    fn build_prompt(&self, question: &str, message: &str) -> String {
        fill_placeholders(
            &self.config.prompt_template,
            &[("{question}", question), ("{message}", message)],
        )
    }
}

#[async_trait]
impl AnswerJudge for LlmJudge {
    async fn does_answer(&self, question: &str, message: &str) -> Result<bool, JudgeError> {
        let request =
            CompletionRequest::new(vec![ChatMessage::system(self.build_prompt(question, message))])
                .with_max_tokens(self.config.max_tokens)
                .with_temperature(self.config.temperature);

        let response = self.llm.complete(request).await.inspect_err(|e| {
            warn!(error = %e, model = self.llm.model_name(), "Judge request failed");
        })?;

        let verdict = parse_verdict(&response.content)?;
        debug!(verdict, raw = %response.content.trim(), "Judge verdict");
        Ok(verdict)
    }
}

/// Substitute every placeholder in one left-to-right pass, so substituted
/// text is never scanned for further placeholders.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = values
            .iter()
            .filter_map(|(key, value)| rest.find(key).map(|at| (at, *key, *value)))
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, key, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// Parse a model's `true` / `false` reply.
///
/// Tolerates case, whitespace, surrounding quotes, and trailing punctuation.
pub fn parse_verdict(raw: &str) -> Result<bool, JudgeError> {
    let normalized = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '!')
        .trim()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(JudgeError::UnparseableVerdict {
            raw: raw.to_string(),
        }),
    }
}
