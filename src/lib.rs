//! askpdf - ask questions about a local document with a local model
//!
//! The document is split into fixed-size word chunks sized to the model's
//! context window; each chunk is asked the question in turn and the
//! answers are joined in chunk order.

pub mod chunking;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod repl;
pub mod session;

pub use chunking::{split_into_chunks, Chunk, TokenEstimator, TokenizerEstimator, WordCountEstimator};
pub use config::{Config, DevicePreference, SamplingConfig};
pub use error::{AskError, CompletionError, ExtractionError, LoadError};
pub use extract::{extractor_for_path, Document, TextExtractor};
pub use llm::{CandleEngine, CandleLoader, CompletionEngine, CompletionResponse, ContextBudget, EngineLoader, EngineOptions};
pub use pipeline::{build_prompt, AskOutcome, AskProgress, Asker, ChunkOutcome, CombinedAnswer, NoProgress, ProgressTracker, SkipReason};
pub use repl::run_repl;
pub use session::{Session, SessionStatus};
