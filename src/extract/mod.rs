//! Document text extraction
//!
//! Turns a file on disk into one string of text. The ask pipeline never
//! looks at file formats; it only sees the resulting [`Document`].

mod pdf;
mod text;

pub use pdf::PdfExtractor;
pub use text::PlainTextExtractor;

use crate::error::ExtractionError;
use std::path::{Path, PathBuf};

/// Produces the full text of a document
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;

    /// Lowercase file extensions this extractor handles
    fn supported_extensions(&self) -> &[&str];
}

/// Text of an imported document, held until the next import replaces it
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Extract a document with the extractor matching its extension
    pub fn open(path: &Path) -> Result<Self, ExtractionError> {
        let text = extractor_for_path(path)?.extract(path)?;
        Ok(Self::new(path, text))
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// File name for display
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Pick an extractor by file extension
pub fn extractor_for_path(path: &Path) -> Result<Box<dyn TextExtractor>, ExtractionError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let extractors: Vec<Box<dyn TextExtractor>> =
        vec![Box::new(PdfExtractor), Box::new(PlainTextExtractor)];

    extractors
        .into_iter()
        .find(|e| e.supported_extensions().contains(&ext.as_str()))
        .ok_or_else(|| ExtractionError::Unsupported(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extractor_for_pdf() {
        let extractor = extractor_for_path(Path::new("paper.PDF")).unwrap();
        assert_eq!(extractor.supported_extensions(), &["pdf"]);
    }

    #[test]
    fn test_extractor_for_unknown_extension() {
        let err = extractor_for_path(Path::new("slides.pptx")).err().unwrap();
        assert!(matches!(err, ExtractionError::Unsupported(_)));

        let err = extractor_for_path(Path::new("no_extension")).err().unwrap();
        assert!(matches!(err, ExtractionError::Unsupported(_)));
    }

    #[test]
    fn test_open_text_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "one two\nthree").unwrap();

        let doc = Document::open(&path).unwrap();
        assert_eq!(doc.word_count(), 3);
        assert_eq!(doc.name(), "notes.txt");
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_whitespace_document_is_empty() {
        let doc = Document::new("blank.txt", " \n\t ");
        assert!(doc.is_empty());
        assert_eq!(doc.word_count(), 0);
    }
}
