use axum::{
    routing::{get, post},
    Router,
};

pub mod chain;
pub mod error;
pub mod state;
mod routes;

use routes::{feedback::sync_feedback, health::health, rag::answer_rag};
use state::CloudState;

/// Router for the cloud tier: the RAG answer endpoint, the feedback sync
/// ingress, and the health probe.
pub fn cloud_routes(state: CloudState) -> Router {
    Router::new()
        .route("/api/rag/answer", post(answer_rag))
        .route("/api/feedback/sync", post(sync_feedback))
        .route("/health", get(health))
        .with_state(state)
}
