use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let generator_ok = state.generator.health_check().await.unwrap_or(false);

    Json(json!({
        "status": "ok",
        "generator_reachable": generator_ok,
        "embedder": state.embedder.describe(),
        "sessions": state.session_count().await,
        "started_at": state.started_at,
    }))
}
