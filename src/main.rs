use std::sync::Arc;

use theme_survey::api::{SurveyRouteState, survey_routes};
use theme_survey::channels::run_survey;
use theme_survey::config::{AppConfig, RunMode};
use theme_survey::llm::create_provider;
use theme_survey::survey::{LlmJudge, TurnEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("Theme Survey v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Judge model: {}", config.llm.model);
    eprintln!(
        "   Survey: {} themes, {} questions",
        config.survey.themes.len(),
        config.survey.question_count()
    );

    let llm = create_provider(&config.llm)?;
    let judge = Arc::new(LlmJudge::new(llm, config.judge.clone()));
    let engine = Arc::new(TurnEngine::new(judge, config.engine.clone()));

    match config.mode {
        RunMode::Cli => {
            eprintln!("   Mode: cli (type /quit to exit)\n");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            let session = run_survey(&engine, &config.survey, stdin, &mut stdout).await?;
            tracing::info!(
                themes_addressed = session.themes.themes_addressed.len(),
                "Survey session ended"
            );
        }
        RunMode::Server => {
            let port = config.server.port;
            eprintln!("   Convo API: http://0.0.0.0:{}/api/convo\n", port);

            let app = survey_routes(SurveyRouteState {
                engine,
                definition: Arc::new(config.survey),
            });
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
            tracing::info!(port, "Survey server started");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
