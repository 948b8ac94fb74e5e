//! Page extraction from uploaded files.

use std::path::Path;

use crate::document::Page;
use crate::error::Result;

/// Extracts ordered page text from a file on disk.
///
/// Implementations may block; the ingestion pipeline calls them from a
/// blocking thread.
pub trait DocumentLoader: Send + Sync {
    /// Return the pages of the file at `path`, in order. A file with no
    /// extractable text returns an empty `Vec`.
    fn load(&self, path: &Path) -> Result<Vec<Page>>;
}

/// Split extracted text into pages at form-feed characters.
///
/// Page numbers are zero-based and keep their position even when a page is
/// empty. Text with no extractable content yields no pages.
pub fn split_pages(text: &str) -> Vec<Page> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    text.split('\x0C')
        .enumerate()
        .filter(|(_, body)| !body.trim().is_empty())
        .map(|(index, body)| Page { text: body.to_string(), page: index as u32 })
        .collect()
}

/// A [`DocumentLoader`] for PDF files backed by the `pdf-extract` crate.
///
/// Only available when the `pdf` feature is enabled.
#[cfg(feature = "pdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

#[cfg(feature = "pdf")]
impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>> {
        let text = pdf_extract::extract_text(path).map_err(|e| {
            crate::error::RagError::ExtractionError(format!("PDF extraction failed: {e}"))
        })?;
        let pages = split_pages(&text);
        tracing::debug!(path = %path.display(), page_count = pages.len(), "extracted pdf pages");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_delimit_pages() {
        let pages = split_pages("cover\x0C\x0Cchapter one\x0C");
        assert_eq!(
            pages,
            vec![
                Page { text: "cover".into(), page: 0 },
                Page { text: "chapter one".into(), page: 2 },
            ]
        );
    }

    #[test]
    fn blank_text_has_no_pages() {
        assert!(split_pages(" \n\x0C ").is_empty());
        assert_eq!(split_pages("single page").len(), 1);
    }
}
