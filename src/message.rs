use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".to_string(), content: content.into() }
    }

    /// Ollama only knows `user` and `assistant` here. Any other speaker label is
    /// treated as the assistant side of the conversation.
    pub fn from_turn(label: &str, content: &str) -> Self {
        let role = if label == "user" { "user" } else { "assistant" };
        ChatMessage { role: role.to_string(), content: content.to_string() }
    }

    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}
