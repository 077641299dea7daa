use axum::Json;
use chrono::Utc;
use serde_json::json;

/// `GET /health` (spec.md §6): always `200 {status:"ok",timestamp}`.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}
