//! Progress reporting for the ask pipeline
//!
//! The pipeline reports chunk-level progress through [`AskProgress`]; the
//! CLI draws it as a progress bar, library callers can ignore it.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress events while chunks are being answered
pub trait AskProgress {
    /// Called once before the first completion call
    fn start(&mut self, _total_chunks: usize) {}

    /// Called after each chunk, successful or not
    fn chunk_done(&mut self, _index: usize, _succeeded: bool) {}

    /// Called once after the last chunk
    fn finish(&mut self) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl AskProgress for NoProgress {}

/// Tracks and displays progress while answering
pub struct ProgressTracker {
    /// Total number of chunks to answer
    total_chunks: usize,
    /// Chunks answered so far
    processed_chunks: usize,
    /// Chunks whose completion failed
    failed_chunks: usize,
    /// `None` in quiet mode
    bar: Option<ProgressBar>,
    /// Whether to show output (false for tests/quiet mode)
    show_output: bool,
}

impl ProgressTracker {
    /// Create a progress tracker that draws a bar on stderr
    pub fn new() -> Self {
        Self {
            total_chunks: 0,
            processed_chunks: 0,
            failed_chunks: 0,
            bar: None,
            show_output: true,
        }
    }

    /// Create a quiet progress tracker (no output)
    pub fn quiet() -> Self {
        Self {
            show_output: false,
            ..Self::new()
        }
    }

    /// Get the number of processed chunks
    pub fn chunks_processed(&self) -> usize {
        self.processed_chunks
    }

    /// Get the number of failed chunks
    pub fn chunks_failed(&self) -> usize {
        self.failed_chunks
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AskProgress for ProgressTracker {
    fn start(&mut self, total_chunks: usize) {
        self.total_chunks = total_chunks;
        self.processed_chunks = 0;
        self.failed_chunks = 0;

        if self.show_output {
            let bar = ProgressBar::new(total_chunks as u64);
            let style = ProgressStyle::with_template("  {spinner} Answering [{bar:30}] {pos}/{len} chunks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            self.bar = Some(bar);
        }
    }

    fn chunk_done(&mut self, _index: usize, succeeded: bool) {
        self.processed_chunks += 1;
        if !succeeded {
            self.failed_chunks += 1;
        }

        if let Some(ref bar) = self.bar {
            if self.failed_chunks > 0 {
                bar.set_message(format!("({} skipped)", self.failed_chunks));
            }
            bar.inc(1);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
