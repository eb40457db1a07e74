//! Message types
//!
//! Chat roles and the messages a session keeps as its history.

use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction placed before the conversation
    System,
    /// Message from the user
    User,
    /// Completion produced by the model
    Assistant,
}

impl Role {
    /// Role name as chat templates expect it
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("translate to ru: hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "translate to ru: hello");
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_role_template_names() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).expect("Failed to serialize");
        assert_eq!(json, "\"assistant\"");
    }
}
