use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::errors::RagError;
use crate::session::Rating;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub turn_index: usize,
    pub rating: Option<Rating>,
    pub comment: Option<String>,
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, RagError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(RagError::BadRequest("question must not be empty".to_string()));
    }

    let session = state.session(&session_id).await?;
    let mut session = session.lock().await;
    let outcome = session.ask(question).await?;

    Ok(Json(json!({
        "answer": outcome.answer,
        "sources": outcome.sources,
        "turn_index": outcome.turn_index,
    })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RagError> {
    let session = state.session(&session_id).await?;
    let session = session.lock().await;

    Ok(Json(json!({
        "turns": session.chat.turns(),
        "stats": session.chat.stats(),
    })))
}

pub async fn feedback(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, RagError> {
    if payload.rating.is_none() && payload.comment.is_none() {
        return Err(RagError::BadRequest(
            "feedback needs a rating or a comment".to_string(),
        ));
    }

    let session = state.session(&session_id).await?;
    let mut session = session.lock().await;

    if let Some(rating) = payload.rating {
        session.chat.give_feedback(payload.turn_index, rating)?;
    }
    if let Some(comment) = &payload.comment {
        session.chat.add_feedback_comment(payload.turn_index, comment)?;
    }

    Ok(Json(json!({"recorded": true})))
}
