//! PDF text extraction.
//!
//! Extracts text page by page, concatenates with page markers, and emits a
//! single [`SourceDocument`] per input file. Files with no extractable text
//! (scanned-image-only PDFs) are skipped, not treated as errors.

use lopdf::Document;

use super::{SourceDocument, SourceType};

/// Extract text from a PDF byte stream. Returns one document, or none when
/// the file is unreadable or yields no text.
pub fn extract_pdf(bytes: &[u8], file_name: &str) -> Vec<SourceDocument> {
    let document = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!("Error processing PDF {}: {}", file_name, err);
            return Vec::new();
        }
    };

    let pages = document.get_pages();
    let page_count = pages.len();
    let mut full_text = String::new();

    for page_number in pages.keys() {
        let text = match document.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    "Failed to extract page {} of {}: {}",
                    page_number,
                    file_name,
                    err
                );
                continue;
            }
        };

        if !text.trim().is_empty() {
            full_text.push_str(&format!("\n\nPage {}:\n{}", page_number, text.trim()));
        }
    }

    if full_text.trim().is_empty() {
        tracing::warn!("No extractable text in {} (scanned images?)", file_name);
        return Vec::new();
    }

    let mut doc = SourceDocument::new(
        full_text.trim().to_string(),
        file_name.to_string(),
        SourceType::Pdf,
    );
    doc.page_count = Some(page_count);
    vec![doc]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_skipped_not_fatal() {
        let docs = extract_pdf(b"definitely not a pdf", "broken.pdf");
        assert!(docs.is_empty());
    }

    #[test]
    fn empty_input_is_skipped() {
        assert!(extract_pdf(&[], "empty.pdf").is_empty());
    }
}
