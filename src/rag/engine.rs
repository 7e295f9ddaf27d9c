//! Query orchestrator.
//!
//! Owns one active namespace at a time and coordinates the ingestion and
//! query pipelines: chunk → embed → upsert on the way in, embed → retrieve
//! → stuff → generate on the way out. State machine:
//! uninitialized until `setup` succeeds, then ready; query-time failures
//! are returned as typed errors and leave the engine ready for the next
//! call. Construction-time collaborator failures are the caller's problem
//! (the engine is never built without a committed embedder).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunker;
use crate::config::Settings;
use crate::embed::Embedder;
use crate::errors::RagError;
use crate::extract::{SourceDocument, SourceType};
use crate::llm::TextGenerator;
use crate::store::{
    self, provision_index, VectorIndex, PERSISTENT_NAMESPACE,
};

use super::prompt::PromptBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Survives restarts; deleted only on explicit request.
    Persistent,
    /// Generated per session; cleaned up when the session is disposed.
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    /// The engine's active namespace.
    Active,
    /// Every session-temporary namespace in the index.
    AllTemporary,
    /// The single persistent namespace.
    Persistent,
}

/// Catalog entry for an ingested source. Display-only; the vector index
/// is authoritative for content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub source_type: SourceType,
    pub added_at: DateTime<Utc>,
}

/// Successful query result: the generated answer plus a document-level,
/// order-preserving deduplicated source list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub document_count: usize,
    pub source_count: usize,
    pub sources: Vec<SourceRecord>,
}

pub struct RagEngine {
    chunker: Chunker,
    prompt_builder: PromptBuilder,
    retrieval_k: usize,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn TextGenerator>,
    namespace: Option<String>,
    sources: Vec<SourceRecord>,
}

impl RagEngine {
    pub fn new(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            chunker: Chunker::new(settings.chunk_size, settings.chunk_overlap),
            prompt_builder: PromptBuilder::new(settings.max_context_chars),
            retrieval_k: settings.retrieval_k,
            embedder,
            index,
            generator,
            namespace: None,
            sources: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.namespace.is_some()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Select and provision the namespace for this engine. On failure the
    /// engine stays uninitialized and setup can be re-invoked.
    pub async fn setup(&mut self, mode: StorageMode) -> Result<(), RagError> {
        let namespace = match mode {
            StorageMode::Persistent => PERSISTENT_NAMESPACE.to_string(),
            StorageMode::Temporary => store::temporary_namespace(),
        };

        provision_index(self.index.as_ref(), self.embedder.dimension()).await?;

        match self.generator.health_check().await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                tracing::warn!(
                    "Generator '{}' is not reachable; queries will fail until it is",
                    self.generator.name()
                );
            }
        }

        tracing::info!("Engine ready (namespace: {})", namespace);
        self.namespace = Some(namespace);
        Ok(())
    }

    /// Chunk, embed and upsert documents, and update the source catalog.
    /// Returns the number of chunks written. Empty input is a warning, not
    /// an error.
    pub async fn add_documents(
        &mut self,
        documents: &[SourceDocument],
    ) -> Result<usize, RagError> {
        let namespace = self.namespace.clone().ok_or(RagError::NotInitialized)?;

        if documents.is_empty() {
            tracing::warn!("No documents to add");
            return Ok(0);
        }

        let chunks = self.chunker.split_documents(documents);
        if chunks.is_empty() {
            tracing::warn!("Documents produced no chunks");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let items: Vec<_> = chunks.into_iter().zip(vectors).collect();
        let written = items.len();
        self.index.upsert(&namespace, items).await?;

        // First-write-wins on (source, type): a re-ingested source is
        // re-embedded but its catalog timestamp is not refreshed.
        for doc in documents {
            let seen = self
                .sources
                .iter()
                .any(|s| s.source_id == doc.source_id && s.source_type == doc.source_type);
            if !seen {
                self.sources.push(SourceRecord {
                    source_id: doc.source_id.clone(),
                    source_type: doc.source_type,
                    added_at: Utc::now(),
                });
            }
        }

        tracing::info!("Added {} chunks to namespace {}", written, namespace);
        Ok(written)
    }

    /// Answer a question from the indexed content. Failures are typed and
    /// leave the engine ready for the next query.
    pub async fn query(&self, question: &str) -> Result<QueryOutcome, RagError> {
        let namespace = self.namespace.as_deref().ok_or(RagError::NotInitialized)?;

        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| RagError::Retrieval(e.to_string()))?;

        let matches = self
            .index
            .query(namespace, &query_vector, self.retrieval_k)
            .await
            .map_err(|e| RagError::Retrieval(e.to_string()))?;

        let stuffed = self.prompt_builder.build(&matches, question);
        let answer = self.generator.generate(&stuffed.prompt, None).await?;

        // Chunk-level matches collapse to a document-level source list,
        // first-occurrence order.
        let mut sources: Vec<String> = Vec::new();
        for m in &stuffed.included {
            if !sources.contains(&m.chunk.source_id) {
                sources.push(m.chunk.source_id.clone());
            }
        }

        Ok(QueryOutcome { answer, sources })
    }

    /// Delete vectors for the given scope. In-memory state is reset (forcing
    /// a new `setup` before the next query) unless the scope is
    /// temporary-only while the active namespace is persistent.
    pub async fn clear(&mut self, scope: ClearScope) -> Result<(), RagError> {
        match scope {
            ClearScope::Active => {
                if let Some(namespace) = &self.namespace {
                    let deleted = self.index.delete_namespace(namespace).await?;
                    tracing::info!("Cleared namespace {} ({} vectors)", namespace, deleted);
                }
                self.reset();
            }
            ClearScope::AllTemporary => {
                let namespaces = self.index.list_namespaces().await?;
                for namespace in namespaces.iter().filter(|ns| store::is_temporary(ns)) {
                    let deleted = self.index.delete_namespace(namespace).await?;
                    tracing::info!("Cleared temporary namespace {} ({} vectors)", namespace, deleted);
                }

                let active_is_persistent = self
                    .namespace
                    .as_deref()
                    .is_some_and(|ns| !store::is_temporary(ns));
                if !active_is_persistent {
                    self.reset();
                }
            }
            ClearScope::Persistent => {
                let deleted = self.index.delete_namespace(PERSISTENT_NAMESPACE).await?;
                tracing::info!("Cleared persistent namespace ({} vectors)", deleted);
                self.reset();
            }
        }

        Ok(())
    }

    /// Explicit cleanup obligation for temporary namespaces, invoked when
    /// the owning session ends.
    pub async fn dispose(&mut self) -> Result<(), RagError> {
        if let Some(namespace) = self.namespace.clone() {
            if store::is_temporary(&namespace) {
                let deleted = self.index.delete_namespace(&namespace).await?;
                tracing::info!(
                    "Disposed temporary namespace {} ({} vectors)",
                    namespace,
                    deleted
                );
            }
        }
        self.reset();
        Ok(())
    }

    pub async fn stats(&self) -> Result<EngineStats, RagError> {
        let document_count = match &self.namespace {
            Some(namespace) => self.index.stats(Some(namespace)).await?.vector_count,
            None => 0,
        };

        Ok(EngineStats {
            document_count,
            source_count: self.sources.len(),
            sources: self.sources.clone(),
        })
    }

    fn reset(&mut self) {
        self.namespace = None;
        self.sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::store::SqliteVectorIndex;

    /// Deterministic bag-of-bytes embedder for tests.
    struct MockEmbedder;

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn describe(&self) -> String {
            "mock".to_string()
        }

        fn dimension(&self) -> usize {
            8
        }

        async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; 8];
                    for b in text.bytes() {
                        v[(b % 8) as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    struct MockGenerator;

    #[async_trait]
    impl TextGenerator for MockGenerator {
        fn name(&self) -> &str {
            "mock"
        }

        async fn health_check(&self) -> Result<bool, RagError> {
            Ok(true)
        }

        async fn generate(&self, prompt: &str, _stop: Option<Vec<String>>) -> Result<String, RagError> {
            Ok(format!("answer from {} prompt chars", prompt.chars().count()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }

        async fn health_check(&self) -> Result<bool, RagError> {
            Ok(false)
        }

        async fn generate(&self, _prompt: &str, _stop: Option<Vec<String>>) -> Result<String, RagError> {
            Err(RagError::Generation("model is down".to_string()))
        }
    }

    fn settings() -> Settings {
        Settings {
            chunk_size: 200,
            chunk_overlap: 20,
            embedding_dimension: 8,
            ..Settings::default()
        }
    }

    async fn shared_index(dir: &TempDir) -> Arc<SqliteVectorIndex> {
        let path = dir.path().join("index.db");
        Arc::new(SqliteVectorIndex::open(path, "test").await.unwrap())
    }

    fn engine_with(
        index: Arc<SqliteVectorIndex>,
        generator: Arc<dyn TextGenerator>,
    ) -> RagEngine {
        RagEngine::new(&settings(), Arc::new(MockEmbedder), index, generator)
    }

    fn web_doc(content: &str, source: &str) -> SourceDocument {
        SourceDocument::new(content.to_string(), source.to_string(), SourceType::Web)
    }

    #[tokio::test]
    async fn query_before_setup_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(shared_index(&dir).await, Arc::new(MockGenerator));

        let err = engine.query("anything?").await.unwrap_err();
        assert!(matches!(err, RagError::NotInitialized));
    }

    #[tokio::test]
    async fn round_trip_returns_the_source() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(shared_index(&dir).await, Arc::new(MockGenerator));
        engine.setup(StorageMode::Temporary).await.unwrap();

        let content = "The quick brown fox jumps over the lazy dog near the river bank.";
        engine
            .add_documents(&[
                web_doc(content, "https://example.com/fox"),
                web_doc("Completely different topic about stars and planets.", "https://example.com/space"),
            ])
            .await
            .unwrap();

        let outcome = engine.query(content).await.unwrap();
        assert!(!outcome.answer.is_empty());
        assert_eq!(outcome.sources.first().map(String::as_str), Some("https://example.com/fox"));
    }

    #[tokio::test]
    async fn empty_namespace_query_is_fail_soft() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(shared_index(&dir).await, Arc::new(MockGenerator));
        engine.setup(StorageMode::Temporary).await.unwrap();

        let outcome = engine.query("is anything indexed?").await.unwrap();
        assert!(outcome.sources.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_is_typed_and_session_survives() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(shared_index(&dir).await, Arc::new(FailingGenerator));
        engine.setup(StorageMode::Temporary).await.unwrap();
        engine
            .add_documents(&[web_doc("Some indexed content for the test.", "doc1")])
            .await
            .unwrap();

        let err = engine.query("question").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        // Still ready; the failure was per-query.
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn source_catalog_deduplicates_on_source_and_type() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(shared_index(&dir).await, Arc::new(MockGenerator));
        engine.setup(StorageMode::Temporary).await.unwrap();

        let doc = web_doc("Catalog content that will be ingested twice.", "https://example.com/page");
        engine.add_documents(std::slice::from_ref(&doc)).await.unwrap();
        let first = engine.stats().await.unwrap();
        let first_added_at = first.sources[0].added_at;

        engine.add_documents(std::slice::from_ref(&doc)).await.unwrap();
        let second = engine.stats().await.unwrap();

        assert_eq!(second.source_count, 1);
        assert_eq!(second.sources[0].added_at, first_added_at);
    }

    #[tokio::test]
    async fn temporary_content_is_invisible_to_persistent_namespace() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir).await;

        let mut temp_engine = engine_with(index.clone(), Arc::new(MockGenerator));
        temp_engine.setup(StorageMode::Temporary).await.unwrap();
        temp_engine
            .add_documents(&[web_doc("Temporary session content only.", "temp-doc")])
            .await
            .unwrap();

        let mut persistent = engine_with(index, Arc::new(MockGenerator));
        persistent.setup(StorageMode::Persistent).await.unwrap();

        let outcome = persistent.query("Temporary session content only.").await.unwrap();
        assert!(outcome.sources.is_empty());
    }

    #[tokio::test]
    async fn clear_active_forces_resetup() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(shared_index(&dir).await, Arc::new(MockGenerator));
        engine.setup(StorageMode::Temporary).await.unwrap();
        engine
            .add_documents(&[web_doc("Content to be cleared shortly.", "doc1")])
            .await
            .unwrap();

        engine.clear(ClearScope::Active).await.unwrap();
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.query("gone?").await,
            Err(RagError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn clearing_temporaries_keeps_a_persistent_session_usable() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir).await;

        let mut temp_engine = engine_with(index.clone(), Arc::new(MockGenerator));
        temp_engine.setup(StorageMode::Temporary).await.unwrap();
        temp_engine
            .add_documents(&[web_doc("Transient content in a temp namespace.", "t1")])
            .await
            .unwrap();

        let mut persistent = engine_with(index.clone(), Arc::new(MockGenerator));
        persistent.setup(StorageMode::Persistent).await.unwrap();
        persistent
            .add_documents(&[web_doc("Durable content in the persistent namespace.", "p1")])
            .await
            .unwrap();

        persistent.clear(ClearScope::AllTemporary).await.unwrap();

        // Persistent session stays ready with its content intact.
        assert!(persistent.is_ready());
        let stats = persistent.stats().await.unwrap();
        assert!(stats.document_count > 0);

        // The temporary namespace is gone from the index.
        let namespaces = index.list_namespaces().await.unwrap();
        assert!(namespaces.iter().all(|ns| !store::is_temporary(ns)));
    }

    #[tokio::test]
    async fn dispose_removes_only_temporary_namespaces() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir).await;

        let mut temp_engine = engine_with(index.clone(), Arc::new(MockGenerator));
        temp_engine.setup(StorageMode::Temporary).await.unwrap();
        temp_engine
            .add_documents(&[web_doc("Session-scoped content.", "t1")])
            .await
            .unwrap();
        temp_engine.dispose().await.unwrap();
        assert!(!temp_engine.is_ready());

        let mut persistent = engine_with(index.clone(), Arc::new(MockGenerator));
        persistent.setup(StorageMode::Persistent).await.unwrap();
        persistent
            .add_documents(&[web_doc("Durable content.", "p1")])
            .await
            .unwrap();
        persistent.dispose().await.unwrap();

        // Persistent namespace survives dispose.
        assert!(index.stats(Some(PERSISTENT_NAMESPACE)).await.unwrap().vector_count > 0);
    }

    #[tokio::test]
    async fn empty_ingest_is_a_warning_not_an_error() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(shared_index(&dir).await, Arc::new(MockGenerator));
        engine.setup(StorageMode::Temporary).await.unwrap();

        assert_eq!(engine.add_documents(&[]).await.unwrap(), 0);
    }
}
