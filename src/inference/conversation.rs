//! Conversation state of a chat session
//!
//! Tracks the message history and how much of the rendered history already sits
//! in the KV cache. Deciding what to evaluate next lives here, away from llama.cpp.

use crate::inference::engine::EngineError;
use crate::types::message::{Message, Role};

/// What to evaluate for the next turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPlan<'r> {
    /// The cache holds a prefix of the rendered history; decode only `suffix`
    Extend { suffix: &'r str },
    /// Evaluate the whole rendered history from position 0
    Restart {
        /// The cache holds tokens that must be dropped first
        clear_cache: bool,
    },
}

/// Choose between extending the cached prefix and re-evaluating everything
pub fn plan_prompt<'r>(evaluated: &str, n_past: i32, rendered: &'r str) -> PromptPlan<'r> {
    if !evaluated.is_empty() {
        if let Some(suffix) = rendered.strip_prefix(evaluated) {
            return PromptPlan::Extend { suffix };
        }
    }
    PromptPlan::Restart {
        clear_cache: n_past > 0,
    }
}

/// Fail when `prompt_tokens` after `n_past` leave no room for a generated token
pub fn check_room(n_past: i32, prompt_tokens: usize, n_ctx: usize) -> Result<(), EngineError> {
    let needed = n_past.max(0) as usize + prompt_tokens + 1;
    if needed > n_ctx {
        return Err(EngineError::ContextOverflow {
            needed,
            available: n_ctx,
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Conversation {
    history: Vec<Message>,
    /// Rendered text whose tokens are in the KV cache
    evaluated: String,
    n_past: i32,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages exchanged so far, oldest first
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Number of tokens in the KV cache
    pub fn n_past(&self) -> i32 {
        self.n_past
    }

    pub fn begin_turn(&mut self, text: &str) {
        self.history.push(Message::user(text));
    }

    pub fn plan<'r>(&self, rendered: &'r str) -> PromptPlan<'r> {
        plan_prompt(&self.evaluated, self.n_past, rendered)
    }

    /// Forget the cache contents after it has been cleared
    pub fn restart(&mut self) {
        self.evaluated.clear();
        self.n_past = 0;
    }

    /// Record one more token submitted to the cache
    pub fn advance(&mut self) {
        self.n_past += 1;
    }

    /// The rendered history is now fully in the cache
    pub fn mark_evaluated(&mut self, rendered: String) {
        self.evaluated = rendered;
    }

    /// Store the generated text and return it trimmed
    pub fn finish_turn(&mut self, raw_reply: &str) -> String {
        self.evaluated.push_str(raw_reply);
        let reply = raw_reply.trim().to_string();
        self.history.push(Message::assistant(reply.clone()));
        reply
    }

    /// Drop the pending user message after a failed turn.
    ///
    /// The cache may hold part of the turn, so the next plan restarts.
    pub fn abort_turn(&mut self) {
        if self
            .history
            .last()
            .is_some_and(|m| m.role == Role::User)
        {
            self.history.pop();
        }
        self.evaluated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_prompt_starts_from_empty_cache() {
        assert_eq!(
            plan_prompt("", 0, "<start_of_turn>user\nhi"),
            PromptPlan::Restart { clear_cache: false }
        );
    }

    #[test]
    fn test_follow_up_extends_cached_prefix() {
        let evaluated = "<start_of_turn>user\nq1<end_of_turn>\n<start_of_turn>model\na1";
        let rendered = format!("{evaluated}<end_of_turn>\n<start_of_turn>user\nq2");
        assert_eq!(
            plan_prompt(evaluated, 40, &rendered),
            PromptPlan::Extend {
                suffix: "<end_of_turn>\n<start_of_turn>user\nq2"
            }
        );
    }

    #[test]
    fn test_diverged_history_clears_cache() {
        // Template trimmed the stored reply
        let evaluated = "user: q1\nassistant:  a1 ";
        let rendered = "user: q1\nassistant: a1\nuser: q2";
        assert_eq!(
            plan_prompt(evaluated, 12, rendered),
            PromptPlan::Restart { clear_cache: true }
        );
    }

    #[test]
    fn test_room_check() {
        assert!(check_room(0, 4095, 4096).is_ok());
        assert!(check_room(100, 3995, 4096).is_ok());
        match check_room(100, 3996, 4096) {
            Err(EngineError::ContextOverflow { needed, available }) => {
                assert_eq!(needed, 4097);
                assert_eq!(available, 4096);
            }
            other => panic!("expected ContextOverflow, got {:?}", other),
        }
    }

    #[test]
    fn test_completed_turns_extend_the_cache() {
        let mut conversation = Conversation::new();
        conversation.begin_turn("q1");
        let rendered = "<user>q1<model>";
        assert_eq!(
            conversation.plan(rendered),
            PromptPlan::Restart { clear_cache: false }
        );
        conversation.restart();
        for _ in 0..5 {
            conversation.advance();
        }
        conversation.mark_evaluated(rendered.to_string());

        let reply = conversation.finish_turn(" Привет ");
        assert_eq!(reply, "Привет");
        assert_eq!(conversation.n_past(), 5);

        conversation.begin_turn("q2");
        let next = "<user>q1<model> Привет <user>q2<model>";
        assert_eq!(
            conversation.plan(next),
            PromptPlan::Extend {
                suffix: "<user>q2<model>"
            }
        );

        let roles: Vec<Role> = conversation.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn test_failed_turn_rolls_back_and_forces_restart() {
        let mut conversation = Conversation::new();
        conversation.begin_turn("q1");
        conversation.restart();
        conversation.advance();
        conversation.advance();
        conversation.mark_evaluated("<user>q1<model>".to_string());
        conversation.finish_turn("a1");

        conversation.begin_turn("q2");
        // Part of the failed turn reached the cache
        conversation.advance();
        conversation.abort_turn();

        assert_eq!(conversation.history().len(), 2);
        assert_eq!(conversation.history()[1].content, "a1");
        assert_eq!(
            conversation.plan("<user>q1<model>a1<user>q3<model>"),
            PromptPlan::Restart { clear_cache: true }
        );

        conversation.restart();
        assert_eq!(conversation.n_past(), 0);
    }
}
