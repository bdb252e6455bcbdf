//! PDF text extraction via `pdf-extract`.

use super::TextExtractor;
use crate::error::ExtractionError;
use std::path::Path;

/// Extracts the text of every page, concatenated in page order
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractionError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if text.trim().is_empty() {
            tracing::warn!(
                "No text could be extracted from '{}'. It may be an image-only PDF.",
                path.display()
            );
        } else {
            tracing::info!(
                words = text.split_whitespace().count(),
                "Extracted text from {}",
                path.display()
            );
        }

        Ok(text)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}
