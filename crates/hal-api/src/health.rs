use axum::{Json, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "Hal Kompleksi API is running",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
