use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::state::CloudState;

#[derive(Debug, Deserialize)]
pub struct RagRequest {
    pub question: String,
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    3
}

/// POST /api/rag/answer: the full retrieve-then-read flow with best-effort
/// tracing, telemetry, and eval enqueueing around it.
///
/// Success is a 200 with a schema-validated body; every failure is a 500
/// with the stable `{message, type, detail}` error shape so the edge client
/// can fall back without parsing surprises.
pub async fn answer_rag(
    State(state): State<CloudState>,
    Json(req): Json<RagRequest>,
) -> impl IntoResponse {
    let started = Instant::now();
    state.trace.start(
        &req.interaction_id,
        "rag.answer",
        json!({ "endpoint": "/api/rag/answer" }),
    );

    let context = state.engine.retrieve(&req.question, req.top_k).await;

    match state
        .chain
        .answer(&req.question, &req.interaction_id, req.top_k, &context)
        .await
    {
        Ok(response) => {
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            state.trace.update(
                &req.interaction_id,
                json!({
                    "latency_ms": latency_ms,
                    "model": state.config.llm.model,
                    "retrieved_k": response.content.len(),
                    "json_valid": true,
                    "http_status": 200,
                }),
            );

            // Enqueue for offline evaluation; failures never reach the client.
            let context_chunks: Vec<String> = response
                .content
                .iter()
                .filter_map(|item| item.get("chunk").and_then(Value::as_str))
                .take(3)
                .map(str::to_string)
                .collect();
            if let Err(err) = state.eval_queue.enqueue(
                &req.interaction_id,
                &req.question,
                &response.message,
                &context_chunks,
            ) {
                debug!(error = %err, "Eval enqueue failed");
            }

            match serde_json::to_value(&response) {
                Ok(body) => (StatusCode::OK, Json(body)).into_response(),
                Err(err) => rag_error_response(&state, &req, started, &err.to_string()),
            }
        }
        Err(err) => {
            error!(error = %err, interaction_id = %req.interaction_id, "RAG pipeline error");
            rag_error_response(&state, &req, started, &err.to_string())
        }
    }
}

fn rag_error_response(
    state: &CloudState,
    req: &RagRequest,
    started: Instant,
    detail: &str,
) -> axum::response::Response {
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    state.trace.update(
        &req.interaction_id,
        json!({
            "latency_ms": latency_ms,
            "model": state.config.llm.model,
            "retrieved_k": req.top_k,
            "json_valid": false,
            "http_status": 500,
        }),
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "message": "RAG pipeline error",
            "type": "error",
            "detail": detail,
        })),
    )
        .into_response()
}
