use axum::Json;
use serde_json::{json, Value};

use common::utils::time::now_utc_iso;

/// GET /health: liveness probe with a current timestamp.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now_utc_iso(),
    }))
}
