//! Context Window Management.
//!
//! The context window is shared between the question, the document chunk
//! and a safety margin. This module decides how many words of document
//! text fit alongside a given question.

use crate::config::{Config, DEFAULT_CONTEXT_WINDOW, DEFAULT_SAFETY_MARGIN};
use crate::error::AskError;
use std::num::NonZeroUsize;

/// Budget for one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Total token capacity of the engine per call.
    pub context_window: usize,
    /// Tokens held back on top of the question.
    pub safety_margin: usize,
}

impl ContextBudget {
    pub fn new(context_window: usize, safety_margin: usize) -> Self {
        Self {
            context_window,
            safety_margin,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.context_window, config.safety_margin)
    }

    /// Chunk size for a question of `question_tokens` tokens.
    ///
    /// available = context_window - question_tokens - safety_margin
    ///
    /// Fails instead of returning zero, so chunking always makes progress.
    pub fn max_context_tokens(&self, question_tokens: usize) -> Result<NonZeroUsize, AskError> {
        let available = self.context_window as i64 - question_tokens as i64 - self.safety_margin as i64;
        usize::try_from(available)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(AskError::DegenerateBudget {
                context_window: self.context_window,
                question_tokens,
                safety_margin: self.safety_margin,
            })
    }

    /// Output cap passed to every completion call.
    ///
    /// This is the whole window, not what is left after the prompt, so a
    /// full chunk plus a full answer can exceed the window. Engines clamp
    /// generation to their own context length.
    pub fn max_output_tokens(&self) -> usize {
        self.context_window
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW, DEFAULT_SAFETY_MARGIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let budget = ContextBudget::default();
        // 512 - 5 - 10
        assert_eq!(budget.max_context_tokens(5).map(NonZeroUsize::get), Ok(497));
        assert_eq!(budget.max_output_tokens(), 512);
    }

    #[test]
    fn test_exact_exhaustion_is_degenerate() {
        let budget = ContextBudget::new(20, 10);
        assert_eq!(budget.max_context_tokens(9), Ok(NonZeroUsize::MIN));
        assert!(matches!(
            budget.max_context_tokens(10),
            Err(AskError::DegenerateBudget { question_tokens: 10, .. })
        ));
    }

    #[test]
    fn test_question_larger_than_window() {
        let budget = ContextBudget::new(16, 10);
        assert!(budget.max_context_tokens(1000).is_err());
    }
}
