//! Candle-based local completion engine (quantized llama, GGUF).
//!
//! Loads a GGUF weights file from disk and runs it with the `candle` crate.
//! No external API calls, pure Rust inference.

use super::provider::{CompletionEngine, EngineLoader, ModelMetadata};
use super::types::{CompletionResponse, Usage};
use crate::config::{Config, DevicePreference, SamplingConfig};
use crate::error::{CompletionError, LoadError};
use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::Tokenizer;

const TOKENIZER_FILE: &str = "tokenizer.json";

// quantized_llama precomputes rotary tables for this many positions
const MAX_SEQ_LEN: usize = 4096;

/// End-of-sequence markers across llama-family vocabularies. Every one
/// present in the vocabulary stops generation.
const EOS_TOKENS: &[&str] = &["</s>", "<|end_of_text|>", "<|eot_id|>", "<|end|>"];

/// How to build a [`CandleEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub device: DevicePreference,
    /// Per-call token capacity; the engine never runs past it even when
    /// the model was trained on a longer context. Zero means the model's own.
    pub context_window: usize,
    pub sampling: SamplingConfig,
    /// Explicit tokenizer.json; otherwise looked up next to the weights
    pub tokenizer: Option<PathBuf>,
    /// Hugging Face repo to fetch tokenizer.json from as a last resort
    pub tokenizer_repo: Option<String>,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device: config.device,
            context_window: config.context_window,
            sampling: config.sampling.clone(),
            tokenizer: None,
            tokenizer_repo: config.tokenizer_repo.clone(),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Option<PathBuf>) -> Self {
        self.tokenizer = tokenizer;
        self
    }
}

/// Local engine using Candle
pub struct CandleEngine {
    model: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
    sampling: SamplingConfig,
    eos_tokens: Vec<u32>,
    context_length: usize,
    id: String,
}

impl CandleEngine {
    pub fn load(path: &Path, options: &EngineOptions) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let invalid = |message: String| LoadError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        // 1. Pick device
        let device = select_device(options.device)?;
        tracing::info!(device = ?device, "Loading model from {}", path.display());

        // 2. Read GGUF header and weights
        let mut file = File::open(path).map_err(|e| invalid(e.to_string()))?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| invalid(e.to_string()))?;
        let context_length = effective_context_length(gguf_context_length(&content), options.context_window);
        let declared_eos = content
            .metadata
            .get("tokenizer.ggml.eos_token_id")
            .and_then(|v| v.to_u32().ok());
        let model = ModelWeights::from_gguf(content, &mut file, &device)
            .map_err(|e| invalid(e.to_string()))?;

        // 3. Tokenizer
        let tokenizer = load_tokenizer(path, options)?;
        let eos_tokens = eos_token_ids(&tokenizer, declared_eos);
        if eos_tokens.is_empty() {
            tracing::warn!("No end-of-sequence token in vocabulary; generation stops at the token cap");
        }

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "gguf-model".to_string());
        tracing::info!(model = %id, context_length, "Model loaded");

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            sampling: options.sampling.clone(),
            eos_tokens,
            context_length,
            id,
        })
    }

    /// Autoregressive sampling loop. Synchronous: the model lock must not
    /// be held across an await.
    fn generate(&self, prompt: &str, max_tokens: usize) -> Result<CompletionResponse, CompletionError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| CompletionError::Tokenize(e.to_string()))?;
        let prompt_tokens = encoding.get_ids().to_vec();

        let to_sample = generation_budget(prompt_tokens.len(), max_tokens, self.context_length)?;
        if to_sample == 0 {
            return Ok(CompletionResponse {
                content: String::new(),
                usage: Usage::new(prompt_tokens.len(), 0),
            });
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| CompletionError::Engine("model lock poisoned".to_string()))?;
        let mut logits_processor = LogitsProcessor::new(
            self.sampling.seed,
            self.sampling.temperature,
            self.sampling.top_p,
        );

        let mut all_tokens = prompt_tokens.clone();
        let mut output_tokens = Vec::new();

        // Prompt pass, then one token at a time against the KV cache
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let logits = model.forward(&input, 0)?.squeeze(0)?;
        let mut next_token = self.sample(&mut logits_processor, &logits, &all_tokens)?;

        for index in 0..to_sample {
            if self.eos_tokens.contains(&next_token) {
                break;
            }
            output_tokens.push(next_token);
            all_tokens.push(next_token);

            if index + 1 == to_sample {
                break;
            }

            let input = Tensor::new(&[next_token], &self.device)?.unsqueeze(0)?;
            let logits = model
                .forward(&input, prompt_tokens.len() + index)?
                .squeeze(0)?;
            next_token = self.sample(&mut logits_processor, &logits, &all_tokens)?;
        }

        let text = self
            .tokenizer
            .decode(&output_tokens, true)
            .map_err(|e| CompletionError::Tokenize(e.to_string()))?;

        Ok(CompletionResponse {
            content: text.trim().to_string(),
            usage: Usage::new(prompt_tokens.len(), output_tokens.len()),
        })
    }

    fn sample(
        &self,
        logits_processor: &mut LogitsProcessor,
        logits: &Tensor,
        context: &[u32],
    ) -> Result<u32, CompletionError> {
        let logits = if self.sampling.repeat_penalty == 1.0 {
            logits.clone()
        } else {
            let start = context.len().saturating_sub(self.sampling.repeat_last_n);
            candle_transformers::utils::apply_repeat_penalty(
                logits,
                self.sampling.repeat_penalty,
                &context[start..],
            )?
        };
        Ok(logits_processor.sample(&logits)?)
    }
}

#[async_trait]
impl CompletionEngine for CandleEngine {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: self.id.clone(),
            context_length: self.context_length,
        }
    }

    fn tokenizer(&self) -> Option<&Tokenizer> {
        Some(&self.tokenizer)
    }

    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<CompletionResponse, CompletionError> {
        self.generate(prompt, max_tokens)
    }
}

/// Loads [`CandleEngine`]s with fixed options
#[derive(Debug, Clone, Default)]
pub struct CandleLoader {
    pub options: EngineOptions,
}

impl CandleLoader {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }
}

impl EngineLoader for CandleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn CompletionEngine>, LoadError> {
        Ok(Box::new(CandleEngine::load(path, &self.options)?))
    }
}

fn select_device(preference: DevicePreference) -> Result<Device, LoadError> {
    let device_err = |e: candle_core::Error| LoadError::Device(e.to_string());
    match preference {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Cuda => Device::new_cuda(0).map_err(device_err),
        DevicePreference::Metal => Device::new_metal(0).map_err(device_err),
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0).map_err(device_err)
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0).map_err(device_err)
            } else {
                Ok(Device::Cpu)
            }
        }
    }
}

/// Tokens left for generation after the prompt.
///
/// A prompt that fills the whole context is rejected; otherwise the
/// requested cap is clamped to what remains.
fn generation_budget(prompt_tokens: usize, max_tokens: usize, context_length: usize) -> Result<usize, CompletionError> {
    if prompt_tokens >= context_length {
        return Err(CompletionError::PromptTooLong {
            prompt_tokens,
            context_length,
        });
    }
    Ok(max_tokens.min(context_length - prompt_tokens))
}

/// Smallest of the model's trained context, the rotary table size and the
/// configured window
fn effective_context_length(model_context: usize, context_window: usize) -> usize {
    let length = model_context.min(MAX_SEQ_LEN);
    if context_window == 0 {
        length
    } else {
        length.min(context_window)
    }
}

/// Known markers found in the vocabulary, plus the id the GGUF header declares
fn eos_token_ids(tokenizer: &Tokenizer, declared: Option<u32>) -> Vec<u32> {
    let mut ids: Vec<u32> = EOS_TOKENS
        .iter()
        .filter_map(|t| tokenizer.token_to_id(t))
        .chain(declared)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// `<arch>.context_length` from GGUF metadata, falling back to llama's key
fn gguf_context_length(content: &gguf_file::Content) -> usize {
    let arch = content
        .metadata
        .get("general.architecture")
        .and_then(|v| v.to_string().ok())
        .cloned()
        .unwrap_or_else(|| "llama".to_string());

    content
        .metadata
        .get(&format!("{}.context_length", arch))
        .and_then(|v| v.to_u32().ok())
        .map(|v| v as usize)
        .unwrap_or(MAX_SEQ_LEN)
}

fn load_tokenizer(weights: &Path, options: &EngineOptions) -> Result<Tokenizer, LoadError> {
    let path = resolve_tokenizer_path(weights, options)?;
    tracing::debug!("Using tokenizer {}", path.display());
    Tokenizer::from_file(&path).map_err(|e| LoadError::Tokenizer(format!("{}: {}", path.display(), e)))
}

fn resolve_tokenizer_path(weights: &Path, options: &EngineOptions) -> Result<PathBuf, LoadError> {
    if let Some(ref explicit) = options.tokenizer {
        if explicit.is_file() {
            return Ok(explicit.clone());
        }
        return Err(LoadError::Tokenizer(format!("{} does not exist", explicit.display())));
    }

    if let Some(sibling) = weights.parent().map(|dir| dir.join(TOKENIZER_FILE)) {
        if sibling.is_file() {
            return Ok(sibling);
        }
    }

    let Some(ref repo_id) = options.tokenizer_repo else {
        return Err(LoadError::Tokenizer(format!(
            "no {} next to {} and no tokenizer_repo configured",
            TOKENIZER_FILE,
            weights.display()
        )));
    };

    let api = ApiBuilder::new()
        .with_progress(true)
        .build()
        .map_err(|e| LoadError::Tokenizer(format!("Failed to create HuggingFace API: {}", e)))?;
    let repo = api.repo(Repo::new(repo_id.clone(), RepoType::Model));
    repo.get(TOKENIZER_FILE)
        .map_err(|e| LoadError::Tokenizer(format!("Failed to fetch {} from {}: {}", TOKENIZER_FILE, repo_id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_weights_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.gguf");
        let err = CandleEngine::load(&path, &EngineOptions::default()).err().unwrap();
        assert!(matches!(err, LoadError::NotFound(p) if p == path));
    }

    #[test]
    fn test_garbage_weights_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        std::fs::write(&path, b"definitely not gguf").unwrap();

        let options = EngineOptions {
            device: DevicePreference::Cpu,
            ..EngineOptions::default()
        };
        let err = CandleEngine::load(&path, &options).err().unwrap();
        assert!(matches!(err, LoadError::Invalid { .. }), "got {:?}", err);
    }

    #[test]
    fn test_tokenizer_found_next_to_weights() {
        let dir = tempdir().unwrap();
        let weights = dir.path().join("model.gguf");
        let sibling = dir.path().join(TOKENIZER_FILE);
        std::fs::write(&sibling, "{}").unwrap();

        let resolved = resolve_tokenizer_path(&weights, &EngineOptions::default()).unwrap();
        assert_eq!(resolved, sibling);
    }

    #[test]
    fn test_explicit_tokenizer_must_exist() {
        let dir = tempdir().unwrap();
        let weights = dir.path().join("model.gguf");
        let options = EngineOptions::default().with_tokenizer(Some(dir.path().join("nope.json")));

        let err = resolve_tokenizer_path(&weights, &options).unwrap_err();
        assert!(matches!(err, LoadError::Tokenizer(m) if m.contains("nope.json")));
    }

    fn word_level_tokenizer(vocab: &str) -> Tokenizer {
        let json = format!(
            r#"{{"version":"1.0","truncation":null,"padding":null,"added_tokens":[],"normalizer":null,"pre_tokenizer":null,"post_processor":null,"decoder":null,"model":{{"type":"WordLevel","vocab":{{{}}},"unk_token":"[UNK]"}}}}"#,
            vocab
        );
        Tokenizer::from_bytes(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_every_eos_marker_is_kept() {
        let tokenizer = word_level_tokenizer(r#""<|end_of_text|>":0,"<|eot_id|>":1,"hello":2,"[UNK]":3"#);
        assert_eq!(eos_token_ids(&tokenizer, None), vec![0, 1]);
        assert_eq!(eos_token_ids(&tokenizer, Some(1)), vec![0, 1]);
    }

    #[test]
    fn test_no_eos_marker_in_vocab() {
        let tokenizer = word_level_tokenizer(r#""hello":0,"[UNK]":1"#);
        assert!(eos_token_ids(&tokenizer, None).is_empty());
        assert_eq!(eos_token_ids(&tokenizer, Some(7)), vec![7]);
    }

    #[test]
    fn test_generation_budget_clamps_to_remaining_context() {
        assert_eq!(generation_budget(511, 512, 512), Ok(1));
        assert_eq!(generation_budget(100, 512, 512), Ok(412));
        assert_eq!(generation_budget(100, 50, 512), Ok(50));
        assert_eq!(generation_budget(100, 0, 512), Ok(0));
    }

    #[test]
    fn test_generation_budget_rejects_full_prompt() {
        assert_eq!(
            generation_budget(512, 512, 512),
            Err(CompletionError::PromptTooLong {
                prompt_tokens: 512,
                context_length: 512,
            })
        );
        assert!(generation_budget(700, 512, 512).is_err());
    }

    #[test]
    fn test_configured_window_caps_model_context() {
        assert_eq!(effective_context_length(8192, 512), 512);
        assert_eq!(effective_context_length(2048, 4000), 2048);
        assert_eq!(effective_context_length(131072, 0), MAX_SEQ_LEN);
    }

    #[test]
    fn test_engine_options_take_window_from_config() {
        let config = Config {
            context_window: 1024,
            ..Config::default()
        };
        assert_eq!(EngineOptions::from_config(&config).context_window, 1024);
    }

    #[test]
    fn test_no_tokenizer_source() {
        let dir = tempdir().unwrap();
        let weights = dir.path().join("model.gguf");
        let err = resolve_tokenizer_path(&weights, &EngineOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Tokenizer(m) if m.contains("tokenizer_repo")));
    }
}
