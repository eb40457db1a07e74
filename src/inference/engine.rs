//! llama.cpp engine
//!
//! Owns the backend and the loaded model. Sessions borrow both.

use crate::inference::model::{validate_gguf, GgufMetadata, ModelError};
use crate::inference::session::LlamaChatSession;
use crate::types::config::GenerationParams;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{LlamaChatTemplate, LlamaModel};
use llama_cpp_2::{send_logs_to_tracing, LogOptions};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Template used when the GGUF file carries none
const FALLBACK_CHAT_TEMPLATE: &str = "chatml";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Backend not initialized")]
    NotInitialized,

    #[error("No model loaded")]
    NoModelLoaded,

    #[error("Failed to initialize backend: {0}")]
    Backend(String),

    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Invalid model file: {0}")]
    InvalidModel(#[from] ModelError),

    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    #[error("Failed to create context: {0}")]
    ContextCreation(String),

    #[error("Chat template error: {0}")]
    Template(String),

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Prompt needs {needed} tokens but the context holds {available}")]
    ContextOverflow { needed: usize, available: usize },
}

/// Information about a loaded model
#[derive(Debug, Clone)]
pub struct LoadedModelInfo {
    /// `general.name` from the GGUF metadata, or the file stem
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Context length the model was trained with
    pub n_ctx_train: u32,
    pub metadata: GgufMetadata,
}

/// Wrapper around the llama.cpp backend and a single loaded model
#[derive(Default)]
pub struct LlamaEngine {
    // Dropped before the backend
    model: Option<LlamaModel>,
    backend: Option<LlamaBackend>,
}

impl LlamaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// Initialize the llama.cpp backend and route its logs into `tracing`
    pub fn init(&mut self) -> Result<(), EngineError> {
        if self.backend.is_some() {
            return Ok(());
        }

        send_logs_to_tracing(LogOptions::default().with_logs_enabled(true));
        let backend = LlamaBackend::init().map_err(|e| EngineError::Backend(e.to_string()))?;
        self.backend = Some(backend);

        tracing::info!("llama.cpp backend initialized");
        Ok(())
    }

    /// Load a GGUF model, replacing any previously loaded one
    pub fn load_model(
        &mut self,
        path: &Path,
        gpu_layers: u32,
    ) -> Result<LoadedModelInfo, EngineError> {
        if !path.is_file() {
            return Err(EngineError::ModelNotFound(path.to_path_buf()));
        }
        let metadata = validate_gguf(path)?;

        let backend = self.backend.as_ref().ok_or(EngineError::NotInitialized)?;

        tracing::info!(
            "Loading model {} (GGUF v{}, {} tensors, {} GPU layers)",
            path.display(),
            metadata.version,
            metadata.tensor_count,
            gpu_layers
        );

        let params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
        let model = LlamaModel::load_from_file(backend, path, &params)
            .map_err(|e| EngineError::LoadFailed(e.to_string()))?;

        let name = model
            .meta_val_str("general.name")
            .ok()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let info = LoadedModelInfo {
            name,
            path: path.to_path_buf(),
            size_bytes: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            n_ctx_train: model.n_ctx_train(),
            metadata,
        };

        tracing::info!(
            "Model {} loaded ({:.2} GB, trained context {})",
            info.name,
            info.size_bytes as f64 / 1024.0 / 1024.0 / 1024.0,
            info.n_ctx_train
        );

        self.model = Some(model);
        Ok(info)
    }

    /// Create a context with one sequence and wrap it in a chat session
    pub fn create_session(
        &self,
        params: GenerationParams,
        system_prompt: &str,
    ) -> Result<LlamaChatSession<'_>, EngineError> {
        let backend = self.backend.as_ref().ok_or(EngineError::NotInitialized)?;
        let model = self.model.as_ref().ok_or(EngineError::NoModelLoaded)?;

        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(params.max_context_size))
            .with_n_batch(params.batch_size);
        if let Some(threads) = params.threads {
            ctx_params = ctx_params
                .with_n_threads(threads)
                .with_n_threads_batch(threads);
        }

        let context = model
            .new_context(backend, ctx_params)
            .map_err(|e| EngineError::ContextCreation(e.to_string()))?;

        let template = match model.chat_template(None) {
            Ok(template) => template,
            Err(e) => {
                tracing::warn!(
                    "Model has no usable chat template ({}), falling back to {}",
                    e,
                    FALLBACK_CHAT_TEMPLATE
                );
                LlamaChatTemplate::new(FALLBACK_CHAT_TEMPLATE)
                    .map_err(|e| EngineError::Template(e.to_string()))?
            }
        };

        Ok(LlamaChatSession::new(
            model,
            context,
            template,
            params,
            system_prompt,
        ))
    }
}
