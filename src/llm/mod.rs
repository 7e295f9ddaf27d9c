//! Generative model capability.
//!
//! [`TextGenerator`] is the seam the answer pipeline talks to: one
//! `generate` call per request, typed failure, no internal retry. The
//! caller decides whether to retry or surface the error inline.

pub mod openai;

use async_trait::async_trait;

use crate::errors::RagError;

pub use openai::OpenAiCompatGenerator;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name (e.g. "openai-compat").
    fn name(&self) -> &str;

    /// Check whether the provider is reachable.
    async fn health_check(&self) -> Result<bool, RagError>;

    /// Single-shot completion for an assembled prompt.
    async fn generate(&self, prompt: &str, stop: Option<Vec<String>>) -> Result<String, RagError>;
}
