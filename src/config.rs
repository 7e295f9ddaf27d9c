//! Runtime settings for the document QA backend.
//!
//! Every knob is overridable through a `DOCQA_*` environment variable and
//! falls back to the defaults below. `validate()` runs once at startup and
//! names the offending variable so operators know what to fix.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::RagError;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible model server.
    pub llm_base_url: String,
    /// Chat model used for answer generation.
    pub llm_model: String,
    /// Preferred embedding model.
    pub embedding_model: String,
    /// Fallback embedding model tried when the preferred one fails to init.
    pub embedding_fallback_model: String,
    /// Optional secondary embeddings endpoint tried after the primary.
    pub embedding_fallback_url: Option<String>,
    /// Output dimension of the embedding models.
    pub embedding_dimension: usize,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    /// Prompt context budget in characters; lowest-scored chunks are
    /// evicted first when retrieved text exceeds it.
    pub max_context_chars: usize,

    pub max_pages_default: usize,
    pub max_pages_limit: usize,
    pub request_timeout_secs: u64,
    pub min_content_length: usize,
    /// Newly discovered links contributed per crawled page.
    pub links_per_page: usize,

    pub chat_history_enabled: bool,
    pub max_chat_history_context: usize,
    pub feedback_enabled: bool,

    /// SQLite file backing the vector index.
    pub index_path: PathBuf,
    /// Name recorded for the provisioned index.
    pub index_name: String,
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_base_url: "http://127.0.0.1:1234".to_string(),
            llm_model: "local-chat".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_fallback_model: "all-MiniLM-L6-v2".to_string(),
            embedding_fallback_url: None,
            embedding_dimension: 384,
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_k: 5,
            max_context_chars: 8000,
            max_pages_default: 3,
            max_pages_limit: 10,
            request_timeout_secs: 10,
            min_content_length: 100,
            links_per_page: 5,
            chat_history_enabled: true,
            max_chat_history_context: 5,
            feedback_enabled: true,
            index_path: PathBuf::from("docqa-index.db"),
            index_name: "docqa".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        Settings {
            llm_base_url: env_string("DOCQA_LLM_BASE_URL", &defaults.llm_base_url),
            llm_model: env_string("DOCQA_LLM_MODEL", &defaults.llm_model),
            embedding_model: env_string("DOCQA_EMBEDDING_MODEL", &defaults.embedding_model),
            embedding_fallback_model: env_string(
                "DOCQA_EMBEDDING_FALLBACK_MODEL",
                &defaults.embedding_fallback_model,
            ),
            embedding_fallback_url: env::var("DOCQA_EMBEDDING_FALLBACK_URL").ok(),
            embedding_dimension: env_usize(
                "DOCQA_EMBEDDING_DIMENSION",
                defaults.embedding_dimension,
            ),
            chunk_size: env_usize("DOCQA_CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: env_usize("DOCQA_CHUNK_OVERLAP", defaults.chunk_overlap),
            retrieval_k: env_usize("DOCQA_RETRIEVAL_K", defaults.retrieval_k),
            max_context_chars: env_usize("DOCQA_MAX_CONTEXT_CHARS", defaults.max_context_chars),
            max_pages_default: env_usize("DOCQA_MAX_PAGES_DEFAULT", defaults.max_pages_default),
            max_pages_limit: env_usize("DOCQA_MAX_PAGES_LIMIT", defaults.max_pages_limit),
            request_timeout_secs: env_u64("DOCQA_REQUEST_TIMEOUT", defaults.request_timeout_secs),
            min_content_length: env_usize("DOCQA_MIN_CONTENT_LENGTH", defaults.min_content_length),
            links_per_page: env_usize("DOCQA_LINKS_PER_PAGE", defaults.links_per_page),
            chat_history_enabled: env_bool(
                "DOCQA_CHAT_HISTORY_ENABLED",
                defaults.chat_history_enabled,
            ),
            max_chat_history_context: env_usize(
                "DOCQA_MAX_CHAT_HISTORY_CONTEXT",
                defaults.max_chat_history_context,
            ),
            feedback_enabled: env_bool("DOCQA_FEEDBACK_ENABLED", defaults.feedback_enabled),
            index_path: PathBuf::from(env_string(
                "DOCQA_INDEX_PATH",
                &defaults.index_path.to_string_lossy(),
            )),
            index_name: env_string("DOCQA_INDEX_NAME", &defaults.index_name),
            log_dir: PathBuf::from(env_string(
                "DOCQA_LOG_DIR",
                &defaults.log_dir.to_string_lossy(),
            )),
        }
    }

    /// Startup validation. Raised before any pipeline work begins.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "DOCQA_CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "DOCQA_CHUNK_OVERLAP ({}) must be smaller than DOCQA_CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.llm_base_url.trim().is_empty() {
            return Err(RagError::Configuration(
                "DOCQA_LLM_BASE_URL must not be empty".to_string(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::Configuration(
                "DOCQA_EMBEDDING_DIMENSION must be greater than zero".to_string(),
            ));
        }
        if self.retrieval_k == 0 {
            return Err(RagError::Configuration(
                "DOCQA_RETRIEVAL_K must be greater than zero".to_string(),
            ));
        }
        if self.max_pages_default > self.max_pages_limit {
            return Err(RagError::Configuration(format!(
                "DOCQA_MAX_PAGES_DEFAULT ({}) exceeds DOCQA_MAX_PAGES_LIMIT ({})",
                self.max_pages_default, self.max_pages_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut settings = Settings::default();
        settings.chunk_overlap = settings.chunk_size;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("DOCQA_CHUNK_OVERLAP"));
    }

    #[test]
    fn empty_llm_url_is_rejected() {
        let settings = Settings {
            llm_base_url: "  ".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(RagError::Configuration(_))
        ));
    }
}
