pub mod analytics;
pub mod engage;
pub mod oauth;
pub mod publish;
pub mod reseller;

use axum::{extract::State, Json};

use crate::AppState;

/// GET /health - liveness plus the adapters this instance can publish to
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "platforms": state.service.registry().kinds(),
    }))
}
