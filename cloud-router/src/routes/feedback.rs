use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::{error::AppError, schema::feedback::FeedbackItem};

use crate::{error::CloudApiError, state::CloudState};

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub items: Vec<FeedbackItem>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub accepted: usize,
    pub duplicates: usize,
}

/// POST /api/feedback/sync: idempotent batch ingestion into the SQLite
/// store; conflicting `feedback_id`s are counted as duplicates, never errors.
pub async fn sync_feedback(
    State(state): State<CloudState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, CloudApiError> {
    let store = Arc::clone(&state.feedback_store);
    let items = req.items;
    let total = items.len();

    let (accepted, duplicates) = tokio::task::spawn_blocking(move || store.upsert_batch(&items))
        .await
        .map_err(AppError::from)?
        .map_err(CloudApiError::from)?;

    info!(total, accepted, duplicates, "Feedback batch synced");
    Ok(Json(SyncResponse {
        accepted,
        duplicates,
    }))
}
