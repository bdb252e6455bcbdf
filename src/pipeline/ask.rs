//! Chunk-and-ask
//!
//! One completion per chunk, strictly in order. A failed chunk is recorded
//! and skipped; it never aborts the rest of the batch.

use serde::Serialize;
use std::num::NonZeroUsize;

use super::progress::AskProgress;
use crate::chunking::{self, Chunk, TokenEstimator, WordCountEstimator};
use crate::error::{AskError, CompletionError};
use crate::extract::Document;
use crate::llm::{CompletionEngine, CompletionResponse, ContextBudget, Usage};

/// Why an ask produced nothing without calling the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoModel,
    NoDocument,
    EmptyQuestion,
}

impl SkipReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoModel => "No model loaded.",
            Self::NoDocument => "No document loaded.",
            Self::EmptyQuestion => "Question is empty.",
        }
    }
}

/// Result of one chunk's completion call
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub index: usize,
    pub word_count: usize,
    pub result: Result<CompletionResponse, CompletionError>,
}

impl ChunkOutcome {
    pub fn answer(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|r| r.content.as_str())
    }
}

/// All per-chunk answers for one question
#[derive(Debug, Clone)]
pub struct CombinedAnswer {
    /// Successful answers joined by newlines, in chunk order
    pub text: String,
    /// Every chunk's outcome, in chunk order
    pub outcomes: Vec<ChunkOutcome>,
    /// Words per chunk used for this ask
    pub chunk_size: usize,
}

impl CombinedAnswer {
    fn from_outcomes(outcomes: Vec<ChunkOutcome>, chunk_size: usize) -> Self {
        let text = outcomes
            .iter()
            .filter_map(ChunkOutcome::answer)
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            outcomes,
            chunk_size,
        }
    }

    /// True when no chunk produced an answer
    pub fn is_empty(&self) -> bool {
        self.answered() == 0
    }

    pub fn answered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.answered()
    }

    /// Summed usage over successful calls
    pub fn usage(&self) -> Usage {
        let mut total = Usage::default();
        for response in self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()) {
            total += response.usage;
        }
        total
    }
}

#[derive(Debug, Clone)]
pub enum AskOutcome {
    Skipped(SkipReason),
    Answered(CombinedAnswer),
}

impl AskOutcome {
    pub fn answer(&self) -> Option<&CombinedAnswer> {
        match self {
            Self::Answered(answer) => Some(answer),
            Self::Skipped(_) => None,
        }
    }
}

/// Prompt for a single chunk
pub fn build_prompt(chunk: &str, question: &str) -> String {
    format!("{}\n\nQuestion: {}\nAnswer:", chunk, question)
}

/// Sizes chunks against a context budget and asks each one
pub struct Asker {
    budget: ContextBudget,
    estimator: Box<dyn TokenEstimator>,
}

impl Asker {
    pub fn new(budget: ContextBudget) -> Self {
        Self {
            budget,
            estimator: Box::new(WordCountEstimator),
        }
    }

    /// Replace word counting with another estimator for the question
    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Words per chunk for this question
    pub fn chunk_size(&self, question: &str) -> Result<NonZeroUsize, AskError> {
        let question_tokens = self.estimator.estimate(question);
        self.budget.max_context_tokens(question_tokens)
    }

    /// Chunks that an ask with this question would send
    pub fn plan(&self, text: &str, question: &str) -> Result<Vec<Chunk>, AskError> {
        let size = self.chunk_size(question)?;
        Ok(chunking::split_into_chunks(text, size))
    }

    /// Ask `question` against every chunk of `document`.
    ///
    /// Missing engine, missing or blank document, or blank question is a
    /// no-op reported as [`AskOutcome::Skipped`]. A budget with no room for
    /// document text fails before any completion call.
    pub async fn ask(
        &self,
        engine: Option<&dyn CompletionEngine>,
        document: Option<&Document>,
        question: &str,
        progress: &mut dyn AskProgress,
    ) -> Result<AskOutcome, AskError> {
        let Some(engine) = engine else {
            return Ok(AskOutcome::Skipped(SkipReason::NoModel));
        };
        let Some(document) = document.filter(|d| !d.is_empty()) else {
            return Ok(AskOutcome::Skipped(SkipReason::NoDocument));
        };
        if question.trim().is_empty() {
            return Ok(AskOutcome::Skipped(SkipReason::EmptyQuestion));
        }

        let chunk_size = self.chunk_size(question)?;
        let total = chunking::chunk_count(&document.text, chunk_size);
        let max_tokens = self.budget.max_output_tokens();
        tracing::debug!(chunk_size = chunk_size.get(), total, max_tokens, "Asking {}", document.name());

        progress.start(total);
        let mut outcomes = Vec::with_capacity(total);
        for chunk in chunking::WordChunks::new(&document.text, chunk_size) {
            let prompt = build_prompt(&chunk.text, question);
            let result = engine.complete(&prompt, max_tokens).await;

            match result {
                Ok(ref response) => tracing::debug!(
                    chunk = chunk.index,
                    completion_tokens = response.usage.completion_tokens,
                    "Chunk answered"
                ),
                Err(ref e) => tracing::warn!(chunk = chunk.index, "Skipping chunk due to error: {}", e),
            }

            progress.chunk_done(chunk.index, result.is_ok());
            outcomes.push(ChunkOutcome {
                index: chunk.index,
                word_count: chunk.word_count,
                result,
            });
        }
        progress.finish();

        Ok(AskOutcome::Answered(CombinedAnswer::from_outcomes(outcomes, chunk_size.get())))
    }
}

impl Default for Asker {
    fn default() -> Self {
        Self::new(ContextBudget::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelMetadata;
    use crate::pipeline::progress::{NoProgress, ProgressTracker};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers with the chunk's word count and remembers every call
    #[derive(Default)]
    struct LengthEngine {
        calls: Mutex<Vec<(String, usize)>>,
        fail_odd: bool,
    }

    impl LengthEngine {
        fn failing_odd() -> Self {
            Self {
                fail_odd: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionEngine for LengthEngine {
        fn metadata(&self) -> ModelMetadata {
            ModelMetadata {
                id: "length".to_string(),
                context_length: 512,
            }
        }

        async fn complete(
            &self,
            prompt: &str,
            max_tokens: usize,
        ) -> Result<CompletionResponse, CompletionError> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((prompt.to_string(), max_tokens));
                calls.len() - 1
            };
            if self.fail_odd && index % 2 == 1 {
                return Err(CompletionError::Engine(format!("chunk {} refused", index)));
            }

            let chunk = prompt.split("\n\nQuestion:").next().unwrap_or_default();
            Ok(CompletionResponse::text(chunk.split_whitespace().count().to_string()))
        }
    }

    /// Chunk size 3 for a one-word question: 14 - 1 - 10
    fn small_asker() -> Asker {
        Asker::new(ContextBudget::new(14, 10))
    }

    async fn ask(asker: &Asker, engine: &LengthEngine, doc: &Document, question: &str) -> AskOutcome {
        asker
            .ask(Some(engine), Some(doc), question, &mut NoProgress)
            .await
            .unwrap()
    }

    #[test]
    fn test_prompt_format() {
        assert_eq!(
            build_prompt("some text", "Why?"),
            "some text\n\nQuestion: Why?\nAnswer:"
        );
    }

    #[tokio::test]
    async fn test_chunk_lengths_joined_in_order() {
        let engine = LengthEngine::default();
        let doc = Document::new("doc.txt", "a b c d e f g");

        let outcome = ask(&small_asker(), &engine, &doc, "why").await;
        let answer = outcome.answer().unwrap();

        assert_eq!(answer.text, "3\n3\n1");
        assert_eq!(answer.chunk_size, 3);
        assert_eq!(engine.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_prompts_carry_chunk_and_full_window_cap() {
        let engine = LengthEngine::default();
        let doc = Document::new("doc.txt", "a b c d e f g");

        ask(&small_asker(), &engine, &doc, "why").await;
        let calls = engine.calls();

        assert_eq!(calls[0].0, "a b c\n\nQuestion: why\nAnswer:");
        assert_eq!(calls[2].0, "g\n\nQuestion: why\nAnswer:");
        assert!(calls.iter().all(|(_, max)| *max == 14));
    }

    #[tokio::test]
    async fn test_odd_failures_are_skipped() {
        let engine = LengthEngine::failing_odd();
        let doc = Document::new("doc.txt", "a b c d e f g h i j");

        // chunks: 3, 3, 3, 1; indices 1 and 3 fail
        let outcome = ask(&small_asker(), &engine, &doc, "why").await;
        let answer = outcome.answer().unwrap();

        assert_eq!(answer.text, "3\n3");
        assert_eq!(answer.answered(), 2);
        assert_eq!(answer.failed(), 2);
        assert_eq!(engine.calls().len(), 4);
        assert_eq!(
            answer.outcomes.iter().map(|o| o.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(answer.outcomes[1].answer().is_none());
    }

    #[tokio::test]
    async fn test_all_chunks_failing_gives_empty_answer() {
        struct Broken;

        #[async_trait]
        impl CompletionEngine for Broken {
            fn metadata(&self) -> ModelMetadata {
                ModelMetadata {
                    id: "broken".to_string(),
                    context_length: 8,
                }
            }

            async fn complete(&self, _: &str, _: usize) -> Result<CompletionResponse, CompletionError> {
                Err(CompletionError::PromptTooLong {
                    prompt_tokens: 100,
                    context_length: 8,
                })
            }
        }

        let doc = Document::new("doc.txt", "a b c d");
        let mut progress = ProgressTracker::quiet();
        let outcome = small_asker()
            .ask(Some(&Broken), Some(&doc), "why", &mut progress)
            .await
            .unwrap();
        let answer = outcome.answer().unwrap();

        assert!(answer.is_empty());
        assert_eq!(answer.text, "");
        assert_eq!(answer.failed(), 2);
        assert_eq!(progress.chunks_failed(), 2);
    }

    #[tokio::test]
    async fn test_degenerate_budget_makes_no_calls() {
        let engine = LengthEngine::default();
        let doc = Document::new("doc.txt", "a b c");
        let asker = Asker::new(ContextBudget::new(12, 10));

        let err = asker
            .ask(Some(&engine), Some(&doc), "two words", &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, AskError::DegenerateBudget { question_tokens: 2, .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_document_is_skipped() {
        let engine = LengthEngine::default();
        let doc = Document::new("doc.txt", "");

        let outcome = ask(&small_asker(), &engine, &doc, "why").await;

        assert!(matches!(outcome, AskOutcome::Skipped(SkipReason::NoDocument)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_engine_and_document_are_skipped() {
        let doc = Document::new("doc.txt", "a b c");
        let outcome = small_asker().ask(None, Some(&doc), "why", &mut NoProgress).await.unwrap();
        assert!(matches!(outcome, AskOutcome::Skipped(SkipReason::NoModel)));

        let engine = LengthEngine::default();
        let outcome = small_asker().ask(Some(&engine), None, "why", &mut NoProgress).await.unwrap();
        assert!(matches!(outcome, AskOutcome::Skipped(SkipReason::NoDocument)));
    }

    #[tokio::test]
    async fn test_blank_question_is_skipped() {
        let engine = LengthEngine::default();
        let doc = Document::new("doc.txt", "a b c");

        let outcome = ask(&small_asker(), &engine, &doc, "   ").await;

        assert!(matches!(outcome, AskOutcome::Skipped(SkipReason::EmptyQuestion)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_estimator_shrinks_chunks() {
        struct Doubling;
        impl TokenEstimator for Doubling {
            fn estimate(&self, text: &str) -> usize {
                text.split_whitespace().count() * 2
            }
        }

        let asker = Asker::new(ContextBudget::new(15, 10)).with_estimator(Box::new(Doubling));
        // 15 - 2 - 10 = 3 with doubling, 4 without
        assert_eq!(asker.chunk_size("why").unwrap().get(), 3);
        assert_eq!(Asker::new(ContextBudget::new(15, 10)).chunk_size("why").unwrap().get(), 4);
    }

    #[test]
    fn test_plan_matches_chunking() {
        let chunks = small_asker().plan("a b c d e f g", "why").unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "d e f");
    }

    #[tokio::test]
    async fn test_usage_sums_successful_calls() {
        struct Counting;

        #[async_trait]
        impl CompletionEngine for Counting {
            fn metadata(&self) -> ModelMetadata {
                ModelMetadata {
                    id: "counting".to_string(),
                    context_length: 512,
                }
            }

            async fn complete(&self, _: &str, _: usize) -> Result<CompletionResponse, CompletionError> {
                Ok(CompletionResponse {
                    content: "ok".to_string(),
                    usage: Usage::new(10, 2),
                })
            }
        }

        let doc = Document::new("doc.txt", "a b c d e f g");
        let outcome = small_asker()
            .ask(Some(&Counting), Some(&doc), "why", &mut NoProgress)
            .await
            .unwrap();

        assert_eq!(outcome.answer().unwrap().usage(), Usage::new(30, 6));
    }
}
