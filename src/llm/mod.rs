//! LLM Layer
//!
//! This module handles everything between a prompt and its continuation:
//! - The engine abstraction (`CompletionEngine`, `EngineLoader`)
//! - Context budgeting for chunk sizing
//! - The local candle engine for GGUF weights

pub mod types;
pub mod provider;
pub mod context;
pub mod candle;

// Re-export key types
pub use candle::{CandleEngine, CandleLoader, EngineOptions};
pub use context::ContextBudget;
pub use provider::{CompletionEngine, EngineLoader, ModelMetadata};
pub use types::{CompletionResponse, Usage};
