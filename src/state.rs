use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::Settings;
use crate::embed::{self, Embedder};
use crate::errors::RagError;
use crate::llm::openai::OpenAiCompatGenerator;
use crate::llm::TextGenerator;
use crate::rag::RagEngine;
use crate::session::SessionState;
use crate::store::{SqliteVectorIndex, VectorIndex};

/// One client session: its retrieval engine and its conversation state.
/// Wrapped in a mutex so each session sees its own calls serialized while
/// different sessions proceed independently.
pub struct Session {
    pub engine: RagEngine,
    pub chat: SessionState,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one conversational ask, after history enhancement and
/// feedback post-processing.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    pub turn_index: usize,
}

impl Session {
    /// Run one question through the session: build the context window,
    /// record the user turn, query, post-process, record the assistant
    /// turn. A failed query still appends an assistant turn carrying the
    /// error text, so the transcript is complete either way.
    pub async fn ask(&mut self, question: &str) -> Result<AskOutcome, RagError> {
        let enhanced = self.chat.enhance_prompt(question);
        self.chat.record_question(question);

        match self.engine.query(&enhanced).await {
            Ok(outcome) => {
                let answer = self.chat.post_process(&outcome.answer);
                self.chat.record_answer(&answer, outcome.sources.clone());
                Ok(AskOutcome {
                    answer,
                    sources: outcome.sources,
                    turn_index: self.chat.turns().len() - 1,
                })
            }
            Err(err) => {
                self.chat.record_answer(&err.to_string(), Vec::new());
                Err(err)
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub index: Arc<SqliteVectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn TextGenerator>,
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize(settings: Settings) -> anyhow::Result<Arc<Self>> {
        settings.validate()?;

        let index = Arc::new(
            SqliteVectorIndex::open(settings.index_path.clone(), &settings.index_name).await?,
        );
        let embedder = embed::init_embedder(&settings).await?;
        let generator: Arc<dyn TextGenerator> = Arc::new(OpenAiCompatGenerator::new(
            &settings.llm_base_url,
            &settings.llm_model,
        ));

        Ok(Arc::new(AppState {
            settings: Arc::new(settings),
            index,
            embedder,
            generator,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            started_at: Utc::now(),
        }))
    }

    pub async fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let engine = RagEngine::new(
            &self.settings,
            self.embedder.clone(),
            self.index.clone() as Arc<dyn VectorIndex>,
            self.generator.clone(),
        );
        let session = Session {
            engine,
            chat: SessionState::new(&self.settings),
            created_at: Utc::now(),
        };

        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!("Created session {}", id);
        id
    }

    pub async fn session(&self, id: &str) -> Result<Arc<Mutex<Session>>, RagError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RagError::NotFound(format!("unknown session: {id}")))
    }

    /// Remove a session and release its temporary namespace, if any.
    pub async fn remove_session(&self, id: &str) -> Result<(), RagError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| RagError::NotFound(format!("unknown session: {id}")))?;

        session.lock().await.engine.dispose().await?;
        tracing::info!("Removed session {}", id);
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::rag::StorageMode;
    use crate::session::Role;

    struct MockEmbedder;

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn describe(&self) -> String {
            "mock".to_string()
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
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

        async fn generate(&self, _prompt: &str, _stop: Option<Vec<String>>) -> Result<String, RagError> {
            Ok("a generated answer".to_string())
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

    async fn session_with(dir: &TempDir, generator: Arc<dyn TextGenerator>) -> Session {
        let index = Arc::new(
            SqliteVectorIndex::open(dir.path().join("index.db"), "test")
                .await
                .unwrap(),
        );
        let settings = Settings::default();
        let mut session = Session {
            engine: RagEngine::new(
                &settings,
                Arc::new(MockEmbedder),
                index as Arc<dyn VectorIndex>,
                generator,
            ),
            chat: SessionState::new(&settings),
            created_at: Utc::now(),
        };
        session.engine.setup(StorageMode::Temporary).await.unwrap();
        session
    }

    #[tokio::test]
    async fn ask_records_both_turns_on_success() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&dir, Arc::new(MockGenerator)).await;

        let outcome = session.ask("what is indexed?").await.unwrap();

        let turns = session.chat.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(outcome.turn_index, 1);
        assert_eq!(turns[1].content, outcome.answer);
    }

    #[tokio::test]
    async fn failed_ask_still_completes_the_transcript() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&dir, Arc::new(FailingGenerator)).await;

        let err = session.ask("doomed question").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));

        // The transcript never ends on a dangling user turn.
        let turns = session.chat.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "doomed question");
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(turns[1].content.contains("model is down"));
        assert!(turns[1].sources.is_empty());
    }
}
