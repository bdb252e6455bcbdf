//! Word chunking
//!
//! Splits document text into fixed-size groups of whitespace-delimited
//! words. No overlap, no semantic boundaries: every word lands in exactly
//! one chunk and chunk order follows the text.

pub mod estimate;

pub use estimate::{TokenEstimator, TokenizerEstimator, WordCountEstimator};

use serde::Serialize;
use std::num::NonZeroUsize;

/// A contiguous run of words from the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the document, starting at 0
    pub index: usize,
    /// Words joined by single spaces
    pub text: String,
    pub word_count: usize,
}

/// Lazily yields chunks of `size` words from `text`.
///
/// Callers get `size` from
/// [`ContextBudget::max_context_tokens`](crate::llm::ContextBudget::max_context_tokens).
pub struct WordChunks<'a> {
    words: std::str::SplitWhitespace<'a>,
    size: usize,
    next_index: usize,
}

impl<'a> WordChunks<'a> {
    pub fn new(text: &'a str, size: NonZeroUsize) -> Self {
        Self {
            words: text.split_whitespace(),
            size: size.get(),
            next_index: 0,
        }
    }
}

impl Iterator for WordChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let group: Vec<&str> = self.words.by_ref().take(self.size).collect();
        if group.is_empty() {
            return None;
        }

        let chunk = Chunk {
            index: self.next_index,
            text: group.join(" "),
            word_count: group.len(),
        };
        self.next_index += 1;
        Some(chunk)
    }
}

/// Split text into chunks of at most `size` words
pub fn split_into_chunks(text: &str, size: NonZeroUsize) -> Vec<Chunk> {
    WordChunks::new(text, size).collect()
}

/// Number of chunks `split_into_chunks` would produce, without allocating them
pub fn chunk_count(text: &str, size: NonZeroUsize) -> usize {
    text.split_whitespace().count().div_ceil(size.get())
}
