//! Embedding gateway.
//!
//! Wraps the embedding capability behind the [`Embedder`] trait and commits
//! to the first configuration in an ordered fallback list that initializes
//! successfully. Once committed, every later call uses that configuration
//! for the lifetime of the process. Nothing downstream can work without
//! vectors, so exhausting the list is fatal.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Settings;
use crate::errors::RagError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Human-readable description of the committed configuration.
    fn describe(&self) -> String;

    /// Fixed output dimension, declared at initialization.
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Retrieval("embedding backend returned no vector".to_string()))
    }
}

/// One entry in the ordered fallback list.
#[derive(Debug, Clone)]
pub struct EmbedderCandidate {
    pub description: String,
    pub base_url: String,
    pub model: String,
}

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    fn new(base_url: &str, model: &str, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        }
    }

    /// Build an embedder for a candidate and verify it end to end with a
    /// probe request, including the declared dimension.
    pub async fn connect(
        candidate: &EmbedderCandidate,
        dimension: usize,
    ) -> Result<Self, RagError> {
        let embedder = Self::new(&candidate.base_url, &candidate.model, dimension);
        let probe = embedder.embed("embedding probe").await?;
        if probe.len() != dimension {
            return Err(RagError::EmbeddingInit(format!(
                "{} returned dimension {} but the index expects {}",
                candidate.description,
                probe.len(),
                dimension
            )));
        }
        Ok(embedder)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn describe(&self) -> String {
        format!("{} @ {}", self.model, self.base_url)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::transient)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::BackendTransient(format!(
                "embeddings endpoint error: {}",
                text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::transient)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(RagError::Retrieval(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Try candidates in order and commit to the first success.
///
/// Separated from the HTTP embedder so the fallback policy is testable on
/// its own.
pub async fn commit_first<T, F, Fut>(
    candidates: &[EmbedderCandidate],
    attempt: F,
) -> Result<T, RagError>
where
    F: Fn(EmbedderCandidate) -> Fut,
    Fut: Future<Output = Result<T, RagError>>,
{
    let mut last_error = None;

    for (i, candidate) in candidates.iter().enumerate() {
        if i > 0 {
            tracing::warn!("Falling back to embedding config: {}", candidate.description);
        }
        match attempt(candidate.clone()).await {
            Ok(value) => {
                tracing::info!("Embeddings initialized: {}", candidate.description);
                return Ok(value);
            }
            Err(err) => {
                tracing::warn!("Embedding config {} failed: {}", candidate.description, err);
                last_error = Some(err);
            }
        }
    }

    Err(RagError::EmbeddingInit(format!(
        "all embedding configurations failed, last error: {}",
        last_error.map_or_else(|| "no candidates configured".to_string(), |e| e.to_string())
    )))
}

/// Build the fallback ladder from settings: preferred model on the primary
/// endpoint, then the secondary endpoint, then the fallback model on each.
pub fn candidates_from_settings(settings: &Settings) -> Vec<EmbedderCandidate> {
    let mut candidates = vec![EmbedderCandidate {
        description: format!("{} (primary endpoint)", settings.embedding_model),
        base_url: settings.llm_base_url.clone(),
        model: settings.embedding_model.clone(),
    }];

    if let Some(fallback_url) = &settings.embedding_fallback_url {
        candidates.push(EmbedderCandidate {
            description: format!("{} (fallback endpoint)", settings.embedding_model),
            base_url: fallback_url.clone(),
            model: settings.embedding_model.clone(),
        });
    }

    if settings.embedding_fallback_model != settings.embedding_model {
        candidates.push(EmbedderCandidate {
            description: format!("{} (fallback model)", settings.embedding_fallback_model),
            base_url: settings.llm_base_url.clone(),
            model: settings.embedding_fallback_model.clone(),
        });
        if let Some(fallback_url) = &settings.embedding_fallback_url {
            candidates.push(EmbedderCandidate {
                description: format!(
                    "{} (fallback model, fallback endpoint)",
                    settings.embedding_fallback_model
                ),
                base_url: fallback_url.clone(),
                model: settings.embedding_fallback_model.clone(),
            });
        }
    }

    candidates
}

/// Initialize the process-wide embedder, walking the fallback ladder.
pub async fn init_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>, RagError> {
    let candidates = candidates_from_settings(settings);
    let dimension = settings.embedding_dimension;

    let embedder = commit_first(&candidates, |candidate| async move {
        HttpEmbedder::connect(&candidate, dimension).await
    })
    .await?;

    Ok(Arc::new(embedder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(name: &str) -> EmbedderCandidate {
        EmbedderCandidate {
            description: name.to_string(),
            base_url: "http://localhost".to_string(),
            model: name.to_string(),
        }
    }

    #[tokio::test]
    async fn commits_to_first_success() {
        let candidates = vec![candidate("a"), candidate("b"), candidate("c")];
        let attempts = AtomicUsize::new(0);

        let committed = commit_first(&candidates, |c| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if c.model == "b" {
                    Ok(c.model)
                } else {
                    Err(RagError::BackendTransient("unreachable".to_string()))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(committed, "b");
        // "c" was never tried.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausting_candidates_is_fatal() {
        let candidates = vec![candidate("a"), candidate("b")];

        let result: Result<String, _> = commit_first(&candidates, |_| async {
            Err(RagError::BackendTransient("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(RagError::EmbeddingInit(_))));
    }

    #[test]
    fn ladder_includes_fallback_model_and_endpoint() {
        let settings = Settings {
            embedding_model: "primary".to_string(),
            embedding_fallback_model: "backup".to_string(),
            embedding_fallback_url: Some("http://fallback:9999".to_string()),
            ..Settings::default()
        };

        let candidates = candidates_from_settings(&settings);
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].model, "primary");
        assert_eq!(candidates[1].base_url, "http://fallback:9999");
        assert_eq!(candidates[2].model, "backup");
    }

    #[test]
    fn identical_fallback_model_is_not_duplicated() {
        let settings = Settings::default();
        let candidates = candidates_from_settings(&settings);
        assert_eq!(candidates.len(), 1);
    }
}
