//! Settings storage
//!
//! Loads and validates the optional `settings.json` in the data directory.
//! Every field falls back to its default, so a missing file behaves exactly like
//! an empty one. The program never writes this file.

use crate::storage::{get_data_dir, StorageError};
use crate::types::config::{GenerationParams, RANDOM_SEED};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Model the scripts load when no settings file overrides it
pub const DEFAULT_MODEL_FILE: &str = "hf_bartowski_gemma-2-27b-it-Q6_K_L.gguf";

const MIN_CONTEXT_SIZE: u32 = 512;
const MAX_CONTEXT_SIZE: u32 = 131072;
/// llama.cpp takes top-k as an `i32`
const MAX_TOP_K: u32 = i32::MAX as u32;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding `.gguf` files. A relative path is looked up next to the
    /// executable first, then in the working directory.
    pub models_directory: PathBuf,
    /// File name of the model inside `models_directory`
    pub model_file: String,
    /// Directory read by `textgen-context`
    pub docs_directory: PathBuf,
    /// Context window size
    pub context_size: u32,
    /// Prompt tokens decoded per batch
    pub batch_size: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Generation threads (llama.cpp default when unset)
    pub threads: Option<i32>,
    /// Cap on tokens generated per prompt; unset runs to end of generation
    pub max_tokens: Option<u32>,
    /// Temperature parameter for text generation (0.0 - 2.0)
    pub temperature: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Fixed sampling seed; random when unset
    pub seed: Option<u32>,
    /// System prompt prepended to the conversation (empty = none)
    pub system_prompt: String,
}

/// System prompt used unless the settings file replaces it
pub fn default_system_prompt() -> String {
    "You are a helpful, respectful and honest assistant. Always answer as helpfully as possible.\n\
If a question does not make any sense, or is not factually coherent, explain why instead of answering something incorrectly. \
If you don't know the answer to a question, don't share false information."
        .to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            models_directory: PathBuf::from("models"),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            docs_directory: PathBuf::from("docs"),
            context_size: 4096,
            batch_size: 512,
            gpu_layers: 0,
            threads: None,
            max_tokens: None,
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            seed: None,
            system_prompt: default_system_prompt(),
        }
    }
}

impl AppSettings {
    /// Validate settings values
    ///
    /// Clamps every numeric parameter into the range llama.cpp accepts and keeps
    /// a `max_tokens` cap and `batch_size` within the context window.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = 40;
        }
        self.top_k = self.top_k.min(MAX_TOP_K);

        self.context_size = self.context_size.clamp(MIN_CONTEXT_SIZE, MAX_CONTEXT_SIZE);
        self.max_tokens = self
            .max_tokens
            .map(|max| max.clamp(1, self.context_size));
        self.batch_size = self.batch_size.clamp(1, self.context_size);

        if matches!(self.threads, Some(n) if n <= 0) {
            self.threads = None;
        }

        if self.model_file.trim().is_empty() {
            self.model_file = DEFAULT_MODEL_FILE.to_string();
        }
    }

    /// Full path of the model file
    pub fn model_path(&self) -> PathBuf {
        resolve_beside_executable(&self.models_directory).join(&self.model_file)
    }

    /// Generation parameters derived from these settings
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            seed: self.seed.unwrap_or(RANDOM_SEED),
            max_context_size: self.context_size,
            batch_size: self.batch_size,
            threads: self.threads,
        }
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> AppSettings {
    let loaded = get_settings_path().and_then(|path| load_settings_from(&path));
    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    }
}

/// Load and validate settings from a specific file
pub fn load_settings_from(path: &Path) -> Result<AppSettings, StorageError> {
    if !path.exists() {
        tracing::debug!("Settings file {} not found, using defaults", path.display());
        return Ok(AppSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: AppSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Resolve a relative directory next to the running executable, falling back to
/// the working directory
pub fn resolve_beside_executable(dir: &Path) -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    resolve_against(exe_dir.as_deref(), dir)
}

fn resolve_against(base: Option<&Path>, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    if let Some(candidate) = base.map(|b| b.join(dir)).filter(|c| c.is_dir()) {
        return candidate;
    }
    dir.to_path_buf()
}
