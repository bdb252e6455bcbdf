//! Ask pipeline
//!
//! Budget, chunk, prompt each chunk in order, join the answers.

pub mod ask;
pub mod progress;

pub use ask::{build_prompt, AskOutcome, Asker, ChunkOutcome, CombinedAnswer, SkipReason};
pub use progress::{AskProgress, NoProgress, ProgressTracker};
