//! Overlapping text chunker.
//!
//! Splits source documents into bounded segments for embedding. Splitting is
//! a pure function of `(chunk_size, chunk_overlap)` and the input text:
//! the same document always yields byte-identical chunks. Each window tries
//! to end on a sentence or word boundary found in its tail before falling
//! back to a hard character cut, and every chunk after the first begins
//! `chunk_overlap` characters before its predecessor's end.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::extract::{SourceDocument, SourceType};

const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

/// A bounded segment of a source document, the unit of embedding and
/// retrieval. Carries the parent document's metadata plus its index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id derived from source, index and content.
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub chunk_index: usize,
    /// Character offset of this chunk in the original document.
    pub start_offset: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap < chunk_size` is validated at startup by
    /// `Settings::validate`; this constructor trusts its inputs.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn split_documents(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect()
    }

    pub fn split_document(&self, document: &SourceDocument) -> Vec<Chunk> {
        let chars: Vec<char> = document.content.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();

        if total == 0 {
            return chunks;
        }

        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let window_end = (start + self.chunk_size).min(total);
            let end = if window_end < total {
                find_break(&chars, start, window_end)
            } else {
                window_end
            };

            let text: String = chars[start..end].iter().collect();
            chunks.push(make_chunk(document, chunk_index, start, text));
            chunk_index += 1;

            if end >= total {
                break;
            }

            // Overlap with the predecessor; always make forward progress.
            let next = end.saturating_sub(self.chunk_overlap);
            start = next.max(start + 1);
        }

        chunks
    }
}

/// Pick a break position in `[start, window_end)`, preferring a sentence
/// ending and then a word boundary within the last 20% of the window.
fn find_break(chars: &[char], start: usize, window_end: usize) -> usize {
    let window_chars = window_end - start;
    let search_from = (window_chars * 80) / 100;

    let tail: String = chars[start + search_from..window_end].iter().collect();

    let mut best: Option<usize> = None;
    for ending in SENTENCE_ENDINGS {
        if let Some(pos) = tail.rfind(ending) {
            let char_pos = tail[..pos + ending.len()].chars().count();
            best = Some(best.map_or(char_pos, |b: usize| b.max(char_pos)));
        }
    }
    if let Some(offset) = best {
        return start + search_from + offset;
    }

    // Word boundary fallback.
    if let Some(pos) = tail.rfind(' ') {
        let char_pos = tail[..pos + 1].chars().count();
        return start + search_from + char_pos;
    }

    window_end
}

fn make_chunk(document: &SourceDocument, index: usize, start: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(document.source_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let id = format!("{:x}", digest)[..32].to_string();

    Chunk {
        id,
        text,
        source_id: document.source_id.clone(),
        source_type: document.source_type,
        title: document.title.clone(),
        chunk_index: index,
        start_offset: start,
    }
}
