//! HTTP boundary: JSON in, turn engine, JSON out.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::error::SurveyError;
use crate::survey::{SurveyDefinition, SurveySession, TurnDecision, TurnEngine};

pub const CLOSING_MESSAGE: &str = "That was the last question. Thanks for sharing all of that with me.";

/// Shared state for survey routes.
#[derive(Clone)]
pub struct SurveyRouteState {
    pub engine: Arc<TurnEngine>,
    pub definition: Arc<SurveyDefinition>,
}

/// Inbound turn. Both states are optional and may be JSON strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConvoRequest {
    pub content: Option<String>,
    pub theme_state: Option<Value>,
    pub conversation_state: Option<Value>,
}

/// Outbound turn.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConvoResponse {
    /// The question to put to the user next, or a closing line.
    pub content: String,
    pub decision: TurnDecision,
    pub theme: String,
    pub did_answer: bool,
    pub theme_state: Value,
    pub conversation_state: Value,
}

/// A failed request, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SurveyError> for ApiError {
    fn from(e: SurveyError) -> Self {
        let status = match e {
            SurveyError::MalformedState { .. } => StatusCode::BAD_REQUEST,
            SurveyError::Oracle(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// POST /api/convo
///
/// Rehydrates the client's state, runs one turn, and returns the updated
/// state for the client to send back next time.
async fn convo(
    State(state): State<SurveyRouteState>,
    body: Bytes,
) -> Result<Json<ConvoResponse>, ApiError> {
    let request: ConvoRequest = if body.is_empty() {
        ConvoRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request: {e}")))?
    };
    let message = request.content.unwrap_or_default();

    let mut session = SurveySession::resume(
        &state.definition,
        request.theme_state,
        request.conversation_state,
    )?;

    let outcome = state
        .engine
        .handle_turn(&mut session.themes, &mut session.conversation, &message)
        .await
        .inspect_err(|e| warn!(error = %e, "Turn failed"))?;

    let content = match outcome.decision {
        TurnDecision::SurveyComplete => CLOSING_MESSAGE.to_string(),
        _ => outcome.current_question.clone().unwrap_or_default(),
    };
    let (theme_state, conversation_state) = session.to_json();

    Ok(Json(ConvoResponse {
        content,
        decision: outcome.decision,
        theme: outcome.theme_label,
        did_answer: outcome.did_answer,
        theme_state,
        conversation_state,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct EchoRequest {
    #[serde(default)]
    content: String,
}

/// POST /api/echo
///
/// Connectivity probe. Unparseable bodies echo an empty string.
async fn echo(body: Bytes) -> impl IntoResponse {
    let request: EchoRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        debug!(error = %e, "Echo body was not JSON");
        EchoRequest::default()
    });
    Json(serde_json::json!({ "content": request.content }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "theme-survey"
    }))
}

/// Any origin may POST JSON; preflight is answered by the layer.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Build the survey routes.
pub fn survey_routes(state: SurveyRouteState) -> Router {
    Router::new()
        .route("/api/convo", post(convo))
        .route("/api/echo", post(echo))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors_layer())
}
