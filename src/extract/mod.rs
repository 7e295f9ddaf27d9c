//! Content extractors.
//!
//! Extractors turn raw sources into plain-text [`SourceDocument`]s:
//! - `web`: breadth-first same-origin crawler with a page budget
//! - `pdf`: per-page text extraction with page markers
//!
//! Extraction never aborts the caller: partial or total failure yields a
//! shorter (possibly empty) document list, with the failures reported
//! through `tracing`.

pub mod pdf;
pub mod web;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use pdf::extract_pdf;
pub use web::WebCrawler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Web,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Pdf => "pdf",
        }
    }
}

/// A plain-text unit produced by an extractor. Immutable once produced;
/// owned by the ingestion pipeline until chunked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub source_id: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub page_count: Option<usize>,
    pub captured_at: DateTime<Utc>,
}

impl SourceDocument {
    pub fn new(content: String, source_id: String, source_type: SourceType) -> Self {
        Self {
            content,
            source_id,
            source_type,
            title: None,
            page_count: None,
            captured_at: Utc::now(),
        }
    }
}
