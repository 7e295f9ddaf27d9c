use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::errors::RagError;
use crate::rag::{ClearScope, StorageMode};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub storage_mode: StorageMode,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub scope: ClearScope,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, RagError> {
    let session_id = state.create_session().await;
    Ok(Json(json!({"session_id": session_id})))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RagError> {
    state.remove_session(&session_id).await?;
    Ok(Json(json!({"deleted": session_id})))
}

pub async fn setup_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<SetupRequest>,
) -> Result<impl IntoResponse, RagError> {
    let session = state.session(&session_id).await?;
    let mut session = session.lock().await;
    session.engine.setup(payload.storage_mode).await?;

    Ok(Json(json!({
        "ready": true,
        "namespace": session.engine.namespace(),
    })))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RagError> {
    let session = state.session(&session_id).await?;
    let session = session.lock().await;
    let engine_stats = session.engine.stats().await?;
    let chat_stats = session.chat.stats();

    Ok(Json(json!({
        "ready": session.engine.is_ready(),
        "document_count": engine_stats.document_count,
        "source_count": engine_stats.source_count,
        "sources": engine_stats.sources,
        "chat": chat_stats,
    })))
}

pub async fn clear(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<ClearRequest>,
) -> Result<impl IntoResponse, RagError> {
    let session = state.session(&session_id).await?;
    let mut session = session.lock().await;
    session.engine.clear(payload.scope).await?;

    // Conversation history goes with the session's own content. When the
    // clear left this session ready (temporary-only scope from a
    // persistent session), its chat log is still valid.
    if !session.engine.is_ready() {
        session.chat.clear();
    }

    Ok(Json(json!({
        "cleared": true,
        "ready": session.engine.is_ready(),
    })))
}
