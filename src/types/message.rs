//! Chat messages sent to the generation collaborator.

use serde::{Deserialize, Serialize};

/// Chat message in the OpenAI-compatible shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Wrap a fully built RAG prompt as a single-turn user conversation.
pub fn single_turn(prompt: impl Into<String>) -> Vec<Message> {
    vec![Message::user(prompt)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let v = serde_json::to_value(Message::user("be terse")).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "be terse");
        let m: Message =
            serde_json::from_value(serde_json::json!({"role": "assistant", "content": "ok"}))
                .unwrap();
        assert_eq!(m.role, MessageRole::Assistant);
    }

    #[test]
    fn test_single_turn() {
        let msgs = single_turn("Context: ...\nQuestion: why?");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, MessageRole::User);
    }
}
