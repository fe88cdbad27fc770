use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::{error::EdgeApiError, services::digest::DigestService, services::history::generate_interaction_id, state::EdgeState};

#[derive(Debug, Deserialize)]
pub struct ContextParams {
    pub token: String,
    pub location_id: String,
    pub user_email: Option<String>,
}

/// POST /api/context: refreshes the location's device context and injects
/// the daily digest into the user's conversation on the first call of the
/// day.
///
/// The device list is shared per location; the digest is tracked per user.
/// Integrator failures map to 502; a digest injection failure does not fail
/// the request because the context refresh already succeeded.
pub async fn update_location_context(
    State(state): State<EdgeState>,
    Query(params): Query<ContextParams>,
) -> Result<impl IntoResponse, EdgeApiError> {
    info!(location_id = %params.location_id, user = ?params.user_email, "Updating location context");

    let devices = state
        .integrator
        .get_devices(&params.token, &params.location_id)
        .await
        .map_err(|err| EdgeApiError::BadGateway(format!("Provider error: {err}")))?;
    info!(
        devices = devices.len(),
        location_id = %params.location_id,
        "Fetched device list"
    );

    if !state
        .digest
        .should_show(&params.location_id, params.user_email.as_deref())
    {
        debug!(user = ?params.user_email, "Daily digest already shown today");
        return Ok(Json(json!({ "status": "no_digest_today" })));
    }

    let digest = state.digest.generate_daily_digest();
    let digest_interaction_id = generate_interaction_id();
    let formatted = DigestService::format_for_injection(&digest, &digest_interaction_id);
    match state
        .history
        .save_message(
            &digest_interaction_id,
            "assistant",
            &formatted,
            params.user_email.as_deref(),
        )
        .await
    {
        Ok(_) => {
            info!(user = ?params.user_email, "Injected daily digest");
            Ok(Json(digest))
        }
        Err(err) => {
            // Context refresh already succeeded; report the digest failure
            // without failing the request.
            error!(error = %err, "Failed to inject daily digest");
            Ok(Json(json!({ "error": "digest_generation_failed" })))
        }
    }
}
