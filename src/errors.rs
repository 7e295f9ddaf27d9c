use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the document QA pipeline.
///
/// `Configuration`, `EmbeddingInit` and `IndexProvisioning` are fatal for
/// the operation that raised them; `Retrieval` and `Generation` are
/// per-query and leave the session usable; `BackendTransient` is surfaced
/// to the caller, who decides whether to retry.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("extraction failed for {src}: {reason}")]
    Extraction { src: String, reason: String },
    #[error("embedding initialization failed: {0}")]
    EmbeddingInit(String),
    #[error("index provisioning failed: {0}")]
    IndexProvisioning(String),
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("backend unavailable: {0}")]
    BackendTransient(String),
    #[error("engine not initialized: call setup first")]
    NotInitialized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    pub fn transient<E: std::fmt::Display>(err: E) -> Self {
        RagError::BackendTransient(err.to_string())
    }

    /// True when re-invoking the same operation can reasonably succeed
    /// without reconstructing the engine.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::BackendTransient(_)
                | RagError::Retrieval(_)
                | RagError::Generation(_)
                | RagError::IndexProvisioning(_)
        )
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            RagError::Configuration(_) | RagError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::NotInitialized => StatusCode::CONFLICT,
            RagError::BackendTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RagError::BackendTransient("quota".into()).is_retryable());
        assert!(RagError::Generation("timeout".into()).is_retryable());
        assert!(!RagError::Configuration("missing key".into()).is_retryable());
        assert!(!RagError::NotInitialized.is_retryable());
    }
}
