//! Chat sessions
//!
//! A session pairs one llama.cpp context (sequence 0) with the conversation
//! history. Each prompt renders the whole history through the chat template and
//! evaluates only the text the KV cache has not seen yet.

use crate::inference::conversation::{check_room, Conversation, PromptPlan};
use crate::inference::engine::EngineError;
use crate::types::config::GenerationParams;
use crate::types::message::Role;
use async_trait::async_trait;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use uuid::Uuid;

/// Anything that answers a prompt with a completion, keeping its own history
#[async_trait(?Send)]
pub trait PromptSession {
    async fn prompt(&mut self, text: &str) -> Result<String, EngineError>;
}

/// Why generation of a reply ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    EndOfGeneration,
    MaxTokens,
    ContextFull,
}

pub struct LlamaChatSession<'a> {
    id: Uuid,
    model: &'a LlamaModel,
    context: LlamaContext<'a>,
    template: LlamaChatTemplate,
    params: GenerationParams,
    system_prompt: Option<String>,
    conversation: Conversation,
}

impl<'a> LlamaChatSession<'a> {
    pub(crate) fn new(
        model: &'a LlamaModel,
        context: LlamaContext<'a>,
        template: LlamaChatTemplate,
        params: GenerationParams,
        system_prompt: &str,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(
            "Chat session {} opened (context {} tokens)",
            id,
            context.n_ctx()
        );
        Self {
            id,
            model,
            context,
            template,
            params,
            system_prompt: Some(system_prompt.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            conversation: Conversation::new(),
        }
    }

    /// Send one user message and return the model's reply
    pub fn prompt_blocking(&mut self, text: &str) -> Result<String, EngineError> {
        self.conversation.begin_turn(text);

        match self.generate_reply() {
            Ok(raw_reply) => Ok(self.conversation.finish_turn(&raw_reply)),
            Err(e) => {
                self.conversation.abort_turn();
                Err(e)
            }
        }
    }

    fn generate_reply(&mut self) -> Result<String, EngineError> {
        let rendered = self.render_history()?;

        let (text, add_bos) = match self.conversation.plan(&rendered) {
            PromptPlan::Extend { suffix } => {
                tracing::debug!(
                    "Reusing {} cached tokens, {} new bytes",
                    self.conversation.n_past(),
                    suffix.len()
                );
                (suffix.to_string(), AddBos::Never)
            }
            PromptPlan::Restart { clear_cache } => {
                if clear_cache {
                    tracing::debug!("Prompt diverged from cache, re-evaluating history");
                    self.context.clear_kv_cache();
                }
                self.conversation.restart();
                (rendered.clone(), self.add_bos_for(&rendered))
            }
        };

        let tokens = self
            .model
            .str_to_token(&text, add_bos)
            .map_err(|e| EngineError::Tokenize(e.to_string()))?;
        if tokens.is_empty() {
            return Err(EngineError::Tokenize("prompt produced no tokens".to_string()));
        }

        let n_ctx = self.context.n_ctx() as usize;
        check_room(self.conversation.n_past(), tokens.len(), n_ctx)?;

        self.evaluate(&tokens)?;
        self.conversation.mark_evaluated(rendered);

        self.sample_reply(n_ctx)
    }

    fn render_history(&self) -> Result<String, EngineError> {
        let template_err = |e: &dyn std::fmt::Display| EngineError::Template(e.to_string());

        let history = self.conversation.history();
        let mut chat = Vec::with_capacity(history.len() + 1);
        if let Some(system) = &self.system_prompt {
            chat.push(
                LlamaChatMessage::new(Role::System.as_str().to_string(), system.clone())
                    .map_err(|e| template_err(&e))?,
            );
        }
        for message in history {
            chat.push(
                LlamaChatMessage::new(message.role.as_str().to_string(), message.content.clone())
                    .map_err(|e| template_err(&e))?,
            );
        }

        self.model
            .apply_chat_template(&self.template, &chat, true)
            .map_err(|e| template_err(&e))
    }

    /// Templates that already spell out the BOS token must not get a second one
    fn add_bos_for(&self, rendered: &str) -> AddBos {
        let bos = self
            .model
            .token_to_str(self.model.token_bos(), Special::Tokenize)
            .unwrap_or_default();
        if !bos.is_empty() && rendered.starts_with(&bos) {
            AddBos::Never
        } else {
            AddBos::Always
        }
    }

    fn evaluate(&mut self, tokens: &[LlamaToken]) -> Result<(), EngineError> {
        let batch_size = self.params.batch_size.max(1) as usize;
        let mut batch = LlamaBatch::new(batch_size, 1);
        let last = tokens.len() - 1;

        for (chunk_index, chunk) in tokens.chunks(batch_size).enumerate() {
            batch.clear();
            for (i, &token) in chunk.iter().enumerate() {
                let is_last = chunk_index * batch_size + i == last;
                batch
                    .add(token, self.conversation.n_past(), &[0], is_last)
                    .map_err(|e| EngineError::Decode(e.to_string()))?;
                self.conversation.advance();
            }
            self.context
                .decode(&mut batch)
                .map_err(|e| EngineError::Decode(e.to_string()))?;
        }

        tracing::debug!(
            "Evaluated {} prompt tokens (n_past={})",
            tokens.len(),
            self.conversation.n_past()
        );
        Ok(())
    }

    fn sample_reply(&mut self, n_ctx: usize) -> Result<String, EngineError> {
        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::top_k(i32::try_from(self.params.top_k).unwrap_or(i32::MAX)),
            LlamaSampler::top_p(self.params.top_p, 1),
            LlamaSampler::temp(self.params.temperature),
            LlamaSampler::dist(self.params.seed),
        ]);

        let mut batch = LlamaBatch::new(1, 1);
        // Pieces can split multi-byte characters, so decode once at the end
        let mut bytes = Vec::new();
        let mut generated = 0u32;
        let stop = loop {
            if self.params.max_tokens.is_some_and(|max| generated >= max) {
                break StopReason::MaxTokens;
            }
            if self.conversation.n_past() as usize >= n_ctx {
                break StopReason::ContextFull;
            }

            let token = sampler.sample(&self.context, -1);
            if self.model.is_eog_token(token) {
                break StopReason::EndOfGeneration;
            }

            match self.model.token_to_bytes(token, Special::Plaintext) {
                Ok(piece) => bytes.extend_from_slice(&piece),
                Err(e) => tracing::warn!("Dropping undecodable token {}: {}", token, e),
            }

            batch.clear();
            batch
                .add(token, self.conversation.n_past(), &[0], true)
                .map_err(|e| EngineError::Decode(e.to_string()))?;
            self.context
                .decode(&mut batch)
                .map_err(|e| EngineError::Decode(e.to_string()))?;

            self.conversation.advance();
            generated += 1;
        };

        match stop {
            StopReason::EndOfGeneration => {
                tracing::info!("Session {} generated {} tokens", self.id, generated)
            }
            StopReason::MaxTokens => tracing::warn!(
                "Session {} reply cut short after {} tokens (max_tokens reached)",
                self.id,
                generated
            ),
            StopReason::ContextFull => tracing::warn!(
                "Session {} reply cut short after {} tokens (context of {} tokens is full)",
                self.id,
                generated,
                n_ctx
            ),
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait(?Send)]
impl PromptSession for LlamaChatSession<'_> {
    async fn prompt(&mut self, text: &str) -> Result<String, EngineError> {
        self.prompt_blocking(text)
    }
}
