//! LLM inference engine
//!
//! This module handles all interaction with llama-cpp for model loading and inference.

pub mod conversation;
pub mod engine;
pub mod model;
pub mod session;

pub use engine::{EngineError, LlamaEngine, LoadedModelInfo};
pub use model::{validate_gguf, GgufMetadata, ModelError, GGUF_MAGIC};
pub use session::{LlamaChatSession, PromptSession};
