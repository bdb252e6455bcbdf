//! The Engine Abstraction.
//!
//! Any backend that turns a prompt into a continuation implements
//! `CompletionEngine`. The ask pipeline only ever sees this trait, so tests
//! substitute stubs without loading weights.

use std::path::Path;

use async_trait::async_trait;
use tokenizers::Tokenizer;

use super::types::CompletionResponse;
use crate::error::{CompletionError, LoadError};

/// Metadata about a loaded model.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub id: String,
    /// Maximum sequence length the model was trained for
    pub context_length: usize,
}

/// The core trait for completion calls.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Get the model's metadata (context length, ID).
    fn metadata(&self) -> ModelMetadata;

    /// The model's tokenizer, when the engine has one.
    ///
    /// Used to swap word counting for real token counting.
    fn tokenizer(&self) -> Option<&Tokenizer> {
        None
    }

    /// Generate at most `max_tokens` tokens continuing `prompt`.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<CompletionResponse, CompletionError>;
}

/// Builds an engine from a weights file.
pub trait EngineLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn CompletionEngine>, LoadError>;
}
