//! textgen
//!
//! Loads a local GGUF model through llama.cpp, opens one chat session and runs a
//! fixed set of prompts against it.

pub mod error;
pub mod inference;
pub mod logging;
pub mod script;
pub mod storage;
pub mod types;

pub use error::AppError;
