//! SQLite-backed vector index.
//!
//! In-process store using SQLite for chunk metadata and brute-force cosine
//! similarity for search. Namespaces are a column; the provisioned
//! embedding dimension is pinned in a meta table and enforced on every
//! upsert.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::chunk::Chunk;
use crate::errors::RagError;
use crate::extract::SourceType;

use super::{IndexStats, VectorIndex, VectorMatch};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    index_name: String,
}

impl SqliteVectorIndex {
    pub async fn open(db_path: PathBuf, index_name: &str) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::transient)?;

        Ok(Self {
            pool,
            index_name: index_name.to_string(),
        })
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectors (
                chunk_id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                source_type TEXT NOT NULL DEFAULT 'web',
                title TEXT,
                chunk_index INTEGER NOT NULL DEFAULT 0,
                start_offset INTEGER NOT NULL DEFAULT 0,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_namespace ON vectors(namespace)")
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    async fn recorded_dimension(&self) -> Result<Option<usize>, RagError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(RagError::internal)?;

        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
        let source_type: String = row.get("source_type");
        let source_type = match source_type.as_str() {
            "pdf" => SourceType::Pdf,
            _ => SourceType::Web,
        };

        Chunk {
            id: row.get("chunk_id"),
            text: row.get("content"),
            source_id: row.get("source"),
            source_type,
            title: row.get("title"),
            chunk_index: row.get::<i64, _>("chunk_index") as usize,
            start_offset: row.get::<i64, _>("start_offset") as usize,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn ensure_ready(&self, dimension: usize) -> Result<(), RagError> {
        self.init_schema().await?;

        match self.recorded_dimension().await? {
            Some(existing) if existing != dimension => {
                return Err(RagError::IndexProvisioning(format!(
                    "index '{}' was provisioned with dimension {} but the embedder produces {}",
                    self.index_name, existing, dimension
                )));
            }
            Some(_) => {
                tracing::info!("Connected to existing index: {}", self.index_name);
            }
            None => {
                sqlx::query(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimension', ?1)",
                )
                .bind(dimension.to_string())
                .execute(&self.pool)
                .await
                .map_err(RagError::internal)?;
                tracing::info!(
                    "Created index '{}' (dimension {}, cosine)",
                    self.index_name,
                    dimension
                );
            }
        }

        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        items: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(), RagError> {
        if items.is_empty() {
            return Ok(());
        }

        let dimension = self.recorded_dimension().await?.ok_or_else(|| {
            RagError::IndexProvisioning("index not provisioned; call ensure_ready first".to_string())
        })?;

        let mut tx = self.pool.begin().await.map_err(RagError::transient)?;

        for (chunk, embedding) in &items {
            if embedding.len() != dimension {
                return Err(RagError::IndexProvisioning(format!(
                    "embedding dimension {} does not match index dimension {}",
                    embedding.len(),
                    dimension
                )));
            }

            let blob = Self::serialize_embedding(embedding);

            sqlx::query(
                "INSERT OR REPLACE INTO vectors
                 (chunk_id, namespace, content, source, source_type, title, chunk_index, start_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&chunk.id)
            .bind(namespace)
            .bind(&chunk.text)
            .bind(&chunk.source_id)
            .bind(chunk.source_type.as_str())
            .bind(&chunk.title)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::transient)?;
        }

        tx.commit().await.map_err(RagError::transient)?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorMatch>, RagError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, source, source_type, title, chunk_index, start_offset, embedding
             FROM vectors
             WHERE namespace = ?1",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::transient)?;

        let mut scored: Vec<VectorMatch> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(vector, &stored);

                Some(VectorMatch {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k.max(1));

        Ok(scored)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<usize, RagError> {
        let result = sqlx::query("DELETE FROM vectors WHERE namespace = ?1")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(RagError::transient)?;

        Ok(result.rows_affected() as usize)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, RagError> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT DISTINCT namespace FROM vectors")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::transient)?;

        Ok(rows)
    }

    async fn stats(&self, namespace: Option<&str>) -> Result<IndexStats, RagError> {
        let count: i64 = if let Some(namespace) = namespace {
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE namespace = ?1")
                .bind(namespace)
                .fetch_one(&self.pool)
                .await
                .map_err(RagError::transient)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
                .fetch_one(&self.pool)
                .await
                .map_err(RagError::transient)?
        };

        Ok(IndexStats {
            vector_count: count as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::provision_index;

    async fn test_index() -> SqliteVectorIndex {
        let tmp = std::env::temp_dir().join(format!("docqa-test-{}.db", uuid::Uuid::new_v4()));
        let index = SqliteVectorIndex::open(tmp, "test-index").await.unwrap();
        index.ensure_ready(3).await.unwrap();
        index
    }

    fn chunk(id: &str, text: &str, source: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source_id: source.to_string(),
            source_type: SourceType::Web,
            title: None,
            chunk_index: 0,
            start_offset: 0,
        }
    }

    #[tokio::test]
    async fn upsert_and_query() {
        let index = test_index().await;

        index
            .upsert(
                "ns1",
                vec![
                    (chunk("c1", "hello world", "doc1"), vec![1.0, 0.0, 0.0]),
                    (chunk("c2", "unrelated", "doc2"), vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let matches = index.query("ns1", &[1.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk.id, "c1");
        assert!(matches[0].score > 0.99);
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let index = test_index().await;

        index
            .upsert(
                "temp-abc",
                vec![(chunk("c1", "secret", "doc1"), vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();

        let matches = index.query("default", &[1.0, 0.0, 0.0], 5).await.unwrap();
        assert!(matches.is_empty());
        assert_eq!(index.stats(Some("temp-abc")).await.unwrap().vector_count, 1);
        assert_eq!(index.stats(Some("default")).await.unwrap().vector_count, 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        let index = test_index().await;

        let err = index.ensure_ready(5).await.unwrap_err();
        assert!(matches!(err, RagError::IndexProvisioning(_)));

        let err = index
            .upsert("ns", vec![(chunk("c1", "text", "doc"), vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexProvisioning(_)));
    }

    #[tokio::test]
    async fn delete_namespace_is_idempotent() {
        let index = test_index().await;

        index
            .upsert(
                "ns1",
                vec![(chunk("c1", "text", "doc"), vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();

        assert_eq!(index.delete_namespace("ns1").await.unwrap(), 1);
        assert_eq!(index.delete_namespace("ns1").await.unwrap(), 0);
        assert_eq!(index.delete_namespace("never-existed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_chunk_ids() {
        let index = test_index().await;

        index
            .upsert(
                "ns1",
                vec![(chunk("c1", "version one", "doc"), vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();
        index
            .upsert(
                "ns1",
                vec![(chunk("c1", "version two", "doc"), vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();

        assert_eq!(index.stats(Some("ns1")).await.unwrap().vector_count, 1);
        let matches = index.query("ns1", &[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(matches[0].chunk.text, "version two");
    }

    #[tokio::test]
    async fn provisioning_is_idempotent_and_ready() {
        let index = test_index().await;
        // Same dimension again: reuse, not error.
        provision_index(&index, 3).await.unwrap();
        index.ensure_ready(3).await.unwrap();
    }

    #[tokio::test]
    async fn list_namespaces_reflects_contents() {
        let index = test_index().await;

        index
            .upsert(
                "default",
                vec![(chunk("c1", "a", "doc"), vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();
        index
            .upsert(
                "temp-x",
                vec![(chunk("c2", "b", "doc"), vec![0.0, 1.0, 0.0])],
            )
            .await
            .unwrap();

        let mut namespaces = index.list_namespaces().await.unwrap();
        namespaces.sort();
        assert_eq!(namespaces, vec!["default", "temp-x"]);
    }
}
