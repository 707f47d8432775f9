//! Terminal channel: run the survey over stdin and stdout.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::api::routes::CLOSING_MESSAGE;
use crate::survey::{SurveyDefinition, SurveySession, TurnDecision, TurnEngine};

const GREETING: &str = "Hi, I'd love to ask you a few questions to understand your situation better.";

/// Drive a whole survey from `input`, writing prompts to `out`.
///
/// Stops at survey completion, EOF, or `/quit`. A failed judge call is
/// reported and the same question stays open. Returns the final session.
pub async fn run_survey<R, W>(
    engine: &TurnEngine,
    definition: &SurveyDefinition,
    input: R,
    out: &mut W,
) -> std::io::Result<SurveySession>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = SurveySession::start(definition);
    let mut lines = input.lines();

    writeln!(out, "Bot: {GREETING}")?;
    if let Some(question) = session.conversation.current_question() {
        writeln!(out, "Bot: {question}")?;
    }

    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        let outcome = match engine
            .handle_turn(&mut session.themes, &mut session.conversation, line)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Turn failed: {}", e);
                writeln!(out, "Bot: Sorry, I couldn't process that. Could you say it again?")?;
                continue;
            }
        };

        match outcome.decision {
            TurnDecision::SurveyComplete => {
                writeln!(out, "Bot: {CLOSING_MESSAGE}")?;
                break;
            }
            TurnDecision::ThemeTransition => {
                writeln!(out, "Bot: Let's talk about {}.", outcome.theme_label)?;
            }
            TurnDecision::AskSameQuestion => {
                writeln!(out, "Bot: I didn't quite catch an answer there.")?;
            }
            TurnDecision::AskNextQuestion => {}
        }
        if let Some(question) = outcome.current_question {
            writeln!(out, "Bot: {question}")?;
        }
    }

    Ok(session)
}
