//! Configuration types
//!
//! Generation parameters handed to a chat session.

use serde::{Deserialize, Serialize};

/// Seed value llama.cpp treats as "pick a random seed"
pub const RANDOM_SEED: u32 = u32::MAX;

/// Parameters for one chat session and every completion it produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Cap on tokens generated per prompt; unset runs to end of generation
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Sampling seed ([`RANDOM_SEED`] for a fresh one on every run)
    pub seed: u32,
    /// Context window of the session, in tokens
    pub max_context_size: u32,
    /// Maximum number of prompt tokens decoded in one batch
    pub batch_size: u32,
    /// Threads used for generation (llama.cpp default when unset)
    pub threads: Option<i32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            seed: RANDOM_SEED,
            max_context_size: 4096,
            batch_size: 512,
            threads: None,
        }
    }
}
