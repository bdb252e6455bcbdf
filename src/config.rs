//! Configuration management for askpdf
//!
//! Handles the context budget, sampling parameters and device choice.
//! Stored as TOML at ~/.askpdf/config.toml; every field has a default so
//! the file is optional.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Total tokens (prompt + completion) a single call is sized against.
pub const DEFAULT_CONTEXT_WINDOW: usize = 512;

/// Tokens held back from the chunk budget on top of the question.
pub const DEFAULT_SAFETY_MARGIN: usize = 10;

/// Device preference for compute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Automatically detect best available device (GPU if available, else CPU)
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// Force Metal GPU (macOS Apple Silicon)
    Metal,
    /// Force CUDA GPU (NVIDIA)
    Cuda,
}

impl DevicePreference {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Metal => "metal",
            Self::Cuda => "cuda",
        }
    }
}

/// Sampling parameters for the local model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub seed: u64,
    /// `temperature = 0.0` gives greedy (argmax) decoding
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    /// 1.0 disables the penalty
    pub repeat_penalty: f32,
    /// How many trailing tokens the repeat penalty looks at
    pub repeat_last_n: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            seed: 299792458,
            temperature: Some(0.8),
            top_p: Some(0.95),
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

/// askpdf configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Token capacity per completion call
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Tokens reserved beyond the question when sizing chunks
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,
    /// Device preference (auto, cpu, metal, cuda)
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Hugging Face repo to fetch tokenizer.json from when none sits next
    /// to the weights file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_repo: Option<String>,
    /// Version of config schema (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

fn default_safety_margin() -> usize {
    DEFAULT_SAFETY_MARGIN
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            device: DevicePreference::default(),
            sampling: SamplingConfig::default(),
            tokenizer_repo: None,
            version: 1,
        }
    }
}

impl Config {
    /// Get the config file path (~/.askpdf/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(askpdf_dir()?.join("config.toml"))
    }

    /// Load config from disk, or return None if it doesn't exist
    pub fn load() -> Result<Option<Self>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load config from disk, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        Ok(Self::load()?.unwrap_or_default())
    }

    /// Parse a config file at an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file, keeping an existing one unless `force`
    pub fn init(force: bool) -> Result<PathBuf> {
        let path = Self::path()?;
        Self::init_at(&path, force)?;
        Ok(path)
    }

    pub fn init_at(path: &std::path::Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        Self::default().save_to(path)
    }

    /// Save config to disk
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject settings that can never produce a chunk
    pub fn validate(&self) -> Result<()> {
        if self.context_window == 0 {
            bail!("context_window must be greater than zero");
        }
        if self.safety_margin >= self.context_window {
            bail!(
                "safety_margin ({}) must be smaller than context_window ({})",
                self.safety_margin,
                self.context_window
            );
        }
        Ok(())
    }
}

/// Get the base askpdf directory path (~/.askpdf)
pub fn askpdf_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".askpdf"))
}
