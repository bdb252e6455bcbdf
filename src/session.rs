//! Session state
//!
//! Holds at most one loaded model and one imported document, and hands
//! both to the ask pipeline on every question. Loading or importing
//! replaces the previous value only on success.

use std::path::Path;

use crate::chunking::TokenizerEstimator;
use crate::error::{AskError, ExtractionError, LoadError};
use crate::extract::Document;
use crate::llm::{CompletionEngine, ContextBudget, EngineLoader, ModelMetadata};
use crate::pipeline::{AskOutcome, AskProgress, Asker};

/// What is currently loaded
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub model: Option<ModelMetadata>,
    pub document: Option<String>,
    pub document_words: usize,
    pub budget: ContextBudget,
}

pub struct Session {
    loader: Box<dyn EngineLoader>,
    engine: Option<Box<dyn CompletionEngine>>,
    document: Option<Document>,
    budget: ContextBudget,
    /// Count question tokens with the model's tokenizer instead of words
    real_tokens: bool,
}

impl Session {
    pub fn new(loader: Box<dyn EngineLoader>, budget: ContextBudget) -> Self {
        Self {
            loader,
            engine: None,
            document: None,
            budget,
            real_tokens: false,
        }
    }

    pub fn with_real_tokens(mut self, real_tokens: bool) -> Self {
        self.real_tokens = real_tokens;
        self
    }

    /// Load a model, replacing the current one
    pub fn load_model(&mut self, path: &Path) -> Result<ModelMetadata, LoadError> {
        let engine = self.loader.load(path)?;
        let metadata = engine.metadata();
        tracing::info!(model = %metadata.id, "Model ready");
        self.engine = Some(engine);
        Ok(metadata)
    }

    /// Import a document, replacing the current one
    pub fn import_document(&mut self, path: &Path) -> Result<&Document, ExtractionError> {
        let document = Document::open(path)?;
        Ok(self.set_document(document))
    }

    pub fn set_document(&mut self, document: Document) -> &Document {
        tracing::info!(words = document.word_count(), "Document imported: {}", document.name());
        self.document.insert(document)
    }

    pub fn has_model(&self) -> bool {
        self.engine.is_some()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            model: self.engine.as_ref().map(|e| e.metadata()),
            document: self.document.as_ref().map(Document::name),
            document_words: self.document.as_ref().map_or(0, Document::word_count),
            budget: self.budget,
        }
    }

    fn asker(&self) -> Asker {
        let asker = Asker::new(self.budget);
        if !self.real_tokens {
            return asker;
        }
        match self.engine.as_ref().and_then(|e| e.tokenizer()) {
            Some(tokenizer) => asker.with_estimator(Box::new(TokenizerEstimator::new(tokenizer.clone()))),
            None => asker,
        }
    }

    /// Ask a question about the current document with the current model
    pub async fn ask(
        &self,
        question: &str,
        progress: &mut dyn AskProgress,
    ) -> Result<AskOutcome, AskError> {
        self.asker()
            .ask(self.engine.as_deref(), self.document.as_ref(), question, progress)
            .await
    }
}
