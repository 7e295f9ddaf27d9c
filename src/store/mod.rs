//! Vector store adapter.
//!
//! [`VectorIndex`] is the namespace-aware seam over the backing vector
//! index: idempotent provisioning, upsert, similarity query, namespace
//! deletion and stats. The in-process implementation is
//! [`sqlite::SqliteVectorIndex`]. Backend failures surface as typed
//! [`RagError`]s so callers can decide to retry or report.

pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::errors::RagError;

pub use sqlite::SqliteVectorIndex;

/// Prefix identifying session-temporary namespaces.
pub const TEMP_NAMESPACE_PREFIX: &str = "temp-";

/// Name of the single persistent namespace.
pub const PERSISTENT_NAMESPACE: &str = "default";

const READY_ATTEMPTS: usize = 10;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A similarity match: chunk metadata plus its cosine score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent provisioning: create the index for `dimension` if absent,
    /// reuse it if present. A differing recorded dimension is fatal.
    async fn ensure_ready(&self, dimension: usize) -> Result<(), RagError>;

    /// Insert or replace chunks with their embeddings in a namespace.
    async fn upsert(
        &self,
        namespace: &str,
        items: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(), RagError>;

    /// Top-`k` cosine similarity search within a namespace, best first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorMatch>, RagError>;

    /// Destructive and irreversible; succeeds on an already-empty namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<usize, RagError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, RagError>;

    async fn stats(&self, namespace: Option<&str>) -> Result<IndexStats, RagError>;
}

/// Provision the index and block until it reports ready.
///
/// Index creation is asynchronous on some backing services; polling here
/// avoids the race where the first upsert lands before the index accepts
/// writes. The poll budget is bounded (about ten seconds).
pub async fn provision_index(index: &dyn VectorIndex, dimension: usize) -> Result<(), RagError> {
    index.ensure_ready(dimension).await?;

    let mut last_error = None;
    for attempt in 0..READY_ATTEMPTS {
        match index.stats(None).await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::debug!("Index not ready (attempt {}): {}", attempt + 1, err);
                last_error = Some(err);
                if attempt + 1 < READY_ATTEMPTS {
                    tokio::time::sleep(READY_POLL_INTERVAL).await;
                }
            }
        }
    }

    Err(RagError::IndexProvisioning(format!(
        "index did not become ready: {}",
        last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
    )))
}

pub fn is_temporary(namespace: &str) -> bool {
    namespace.starts_with(TEMP_NAMESPACE_PREFIX)
}

/// Generate a fresh session-temporary namespace name.
pub fn temporary_namespace() -> String {
    format!("{}{}", TEMP_NAMESPACE_PREFIX, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_namespaces_are_recognized() {
        let ns = temporary_namespace();
        assert!(is_temporary(&ns));
        assert!(!is_temporary(PERSISTENT_NAMESPACE));
    }

    #[test]
    fn temporary_namespaces_are_unique() {
        assert_ne!(temporary_namespace(), temporary_namespace());
    }
}
