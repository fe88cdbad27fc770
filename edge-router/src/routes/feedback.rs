use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::{services::feedback::FeedbackKind, state::EdgeState};

#[derive(Debug, Deserialize)]
pub struct FeedbackParams {
    pub interaction_id: String,
    pub user_email: Option<String>,
}

fn parse_kind(kind: &str) -> Option<FeedbackKind> {
    match kind {
        "positive" => Some(FeedbackKind::Positive),
        "negative" => Some(FeedbackKind::Negative),
        _ => None,
    }
}

/// POST /api/feedback/{positive|negative}: records one thumbs signal after
/// validating the interaction exists in the caller's history.
pub async fn submit_feedback(
    State(state): State<EdgeState>,
    Path(kind): Path<String>,
    Query(params): Query<FeedbackParams>,
) -> impl IntoResponse {
    let Some(kind) = parse_kind(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "response": "error", "message": "Unknown feedback kind." })),
        )
            .into_response();
    };

    if !state
        .feedback
        .interaction_exists(&params.interaction_id, params.user_email.as_deref())
    {
        warn!(
            interaction_id = %params.interaction_id,
            "Feedback rejected; interaction not found in conversation history"
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "response": "error",
                "message": "Invalid interaction ID. The specified interaction was not found in \
                            conversation history.",
            })),
        )
            .into_response();
    }

    match state
        .feedback
        .save(kind, &params.interaction_id, params.user_email.as_deref())
        .await
    {
        Ok(record) => {
            info!(
                kind = kind.as_str(),
                feedback_id = %record["feedback_id"],
                "Feedback recorded"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "response": "ok",
                    "message": format!("{} feedback recorded successfully.", capitalize(kind.as_str())),
                    "feedback_id": record["feedback_id"],
                })),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, kind = kind.as_str(), "Failed to save feedback");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "response": "error",
                    "message": format!("Failed to save {} feedback.", kind.as_str()),
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/feedback/{positive|negative}/stats: summary counters.
pub async fn feedback_stats(
    State(state): State<EdgeState>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let Some(kind) = parse_kind(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "response": "error", "message": "Unknown feedback kind." })),
        )
            .into_response();
    };

    let stats: Value = state.feedback.statistics(kind);
    (
        StatusCode::OK,
        Json(json!({ "response": "ok", "data": stats })),
    )
        .into_response()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
