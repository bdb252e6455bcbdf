//! Error types for askpdf.
//!
//! Each external collaborator gets its own error enum so callers can tell
//! a bad document from a bad model from a single failed completion.

use std::path::PathBuf;
use thiserror::Error;

/// Document text could not be produced.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract text from {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported document format: {0}")]
    Unsupported(PathBuf),
}

/// A model weights file could not be turned into a usable engine.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid model file {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(String),

    #[error("Device unavailable: {0}")]
    Device(String),
}

/// A single completion call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Prompt of {prompt_tokens} tokens exceeds context length {context_length}")]
    PromptTooLong {
        prompt_tokens: usize,
        context_length: usize,
    },

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl From<candle_core::Error> for CompletionError {
    fn from(e: candle_core::Error) -> Self {
        CompletionError::Engine(e.to_string())
    }
}

/// The ask operation could not run at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AskError {
    #[error(
        "Context window {context_window} leaves no room for chunks \
         (question uses {question_tokens} tokens, safety margin {safety_margin})"
    )]
    DegenerateBudget {
        context_window: usize,
        question_tokens: usize,
        safety_margin: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_budget_message_names_numbers() {
        let err = AskError::DegenerateBudget {
            context_window: 16,
            question_tokens: 8,
            safety_margin: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains("8 tokens"));
        assert!(msg.contains("margin 10"));
    }

    #[test]
    fn test_candle_error_maps_to_engine() {
        let err: CompletionError = candle_core::Error::Msg("boom".to_string()).into();
        assert!(matches!(err, CompletionError::Engine(ref m) if m.contains("boom")));
    }
}
