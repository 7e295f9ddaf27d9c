use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, health, ingest, sessions};
use crate::state::AppState;

/// Main application router: health probe, session lifecycle, ingestion and
/// chat endpoints, with CORS and request tracing layered on top.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/:session_id",
            delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/setup",
            post(sessions::setup_session),
        )
        .route(
            "/api/sessions/:session_id/ingest/web",
            post(ingest::ingest_web),
        )
        .route(
            "/api/sessions/:session_id/ingest/pdf",
            post(ingest::ingest_pdf),
        )
        .route("/api/sessions/:session_id/ask", post(chat::ask))
        .route("/api/sessions/:session_id/history", get(chat::history))
        .route("/api/sessions/:session_id/feedback", post(chat::feedback))
        .route("/api/sessions/:session_id/stats", get(sessions::stats))
        .route("/api/sessions/:session_id/clear", post(sessions::clear))
        .with_state(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer() -> CorsLayer {
    let origins = ["http://localhost:3000", "http://127.0.0.1:3000"]
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
