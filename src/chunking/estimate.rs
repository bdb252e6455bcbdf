//! Token estimation for budget sizing.

use tokenizers::Tokenizer;

/// Estimates how many tokens a piece of text occupies.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Counts whitespace-delimited words as tokens.
///
/// Real tokenizers usually produce more tokens than words, so this
/// underestimates; the safety margin absorbs part of the difference.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCountEstimator;

impl TokenEstimator for WordCountEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Counts tokens with the model's own tokenizer.
#[derive(Clone)]
pub struct TokenizerEstimator {
    tokenizer: Tokenizer,
}

impl TokenizerEstimator {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }
}

impl TokenEstimator for TokenizerEstimator {
    fn estimate(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                tracing::warn!("Tokenizer failed, falling back to word count: {}", e);
                WordCountEstimator.estimate(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(WordCountEstimator.estimate(""), 0);
        assert_eq!(WordCountEstimator.estimate("What is   this\tdocument about?"), 5);
    }
}
