//! Retrieval-augmented generation core.
//!
//! - `prompt`: stuff-strategy prompt assembly with context-budget eviction
//! - `engine`: the query orchestrator state machine

pub mod engine;
pub mod prompt;

pub use engine::{ClearScope, EngineStats, QueryOutcome, RagEngine, SourceRecord, StorageMode};
pub use prompt::{PromptBuilder, StuffedPrompt};
