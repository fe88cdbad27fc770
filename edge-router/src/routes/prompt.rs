use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::state::EdgeState;

#[derive(Debug, Deserialize)]
pub struct PromptParams {
    pub message: String,
    pub token: String,
    pub location_id: String,
    pub user_email: Option<String>,
}

/// POST /api/prompt: the conversational entry point.
///
/// The orchestrator always produces a JSON string; non-JSON model output is
/// wrapped into a stable text structure so clients can parse every response.
pub async fn handle_prompt(
    State(state): State<EdgeState>,
    Query(params): Query<PromptParams>,
) -> impl IntoResponse {
    match params.user_email.as_deref() {
        Some(user) => info!(user, location_id = %params.location_id, "Received prompt"),
        None => warn!(
            location_id = %params.location_id,
            "Received prompt without user_email; using global session"
        ),
    }

    let outcome = state
        .orchestrator
        .process(
            &params.message,
            &params.token,
            &params.location_id,
            params.user_email.as_deref(),
        )
        .await;

    match serde_json::from_str::<Value>(&outcome.response_content) {
        Ok(value) if value.is_object() => (StatusCode::OK, Json(value)).into_response(),
        Ok(other) => (
            StatusCode::OK,
            Json(json!({ "data": other, "interactionId": outcome.interaction_id })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Pipeline output was not JSON; wrapping as text");
            (
                StatusCode::OK,
                Json(json!({
                    "message": outcome.response_content,
                    "type": "text",
                    "interactionId": outcome.interaction_id,
                })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetParams {
    pub user_email: Option<String>,
}

/// POST /api/reset: archives the active conversation; a missing or empty
/// file still counts as success.
pub async fn reset_conversation(
    State(state): State<EdgeState>,
    Query(params): Query<ResetParams>,
) -> impl IntoResponse {
    match state
        .history
        .archive_active_conversation(params.user_email.as_deref())
        .await
    {
        Ok(message) => {
            info!(%message, "Conversation archived");
            (
                StatusCode::OK,
                Json(json!({ "response": "ok", "message": message })),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "Failed to archive conversation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "response": "error", "message": err.to_string() })),
            )
                .into_response()
        }
    }
}
