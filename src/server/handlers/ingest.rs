use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::errors::RagError;
use crate::extract::{extract_pdf, WebCrawler};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestWebRequest {
    pub url: String,
    pub max_pages: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct IngestPdfQuery {
    pub file_name: String,
}

pub async fn ingest_web(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<IngestWebRequest>,
) -> Result<impl IntoResponse, RagError> {
    let session = state.session(&session_id).await?;

    let max_pages = payload
        .max_pages
        .unwrap_or(state.settings.max_pages_default)
        .min(state.settings.max_pages_limit)
        .max(1);

    // Crawl outside the session lock; only indexing needs it.
    let crawler = WebCrawler::new(&state.settings);
    let documents = crawler.crawl(&payload.url, max_pages).await;

    let mut session = session.lock().await;
    let chunks_added = session.engine.add_documents(&documents).await?;

    Ok(Json(json!({
        "documents_ingested": documents.len(),
        "chunks_added": chunks_added,
    })))
}

pub async fn ingest_pdf(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<IngestPdfQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, RagError> {
    if body.is_empty() {
        return Err(RagError::BadRequest("empty PDF upload".to_string()));
    }
    let session = state.session(&session_id).await?;

    let documents = extract_pdf(&body, &query.file_name);

    let mut session = session.lock().await;
    let chunks_added = session.engine.add_documents(&documents).await?;

    Ok(Json(json!({
        "documents_ingested": documents.len(),
        "chunks_added": chunks_added,
    })))
}
