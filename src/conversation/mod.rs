//! Conversation types and client-side state

pub mod markdown;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Reply substituted when the backend could not answer
pub const APOLOGY: &str = "Sorry, something went wrong while getting a reply. Please try again.";

/// Conversation held by a client for the lifetime of a session.
///
/// Nothing here is persisted; the full message list is sent with every
/// request and the backend keeps no state between calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: &str) {
        self.messages.push(Message::assistant(content));
    }

    /// Record a failed turn with the apology message
    pub fn add_apology(&mut self) {
        self.add_assistant(APOLOGY);
    }

    /// Push an empty assistant message that streamed text will fill in
    pub fn begin_assistant(&mut self) {
        self.messages.push(Message::assistant(String::new()));
    }

    /// Replace the content of the trailing assistant message.
    ///
    /// Returns `false` and leaves the conversation untouched when the last
    /// message is not an assistant message.
    pub fn update_last_assistant(&mut self, content: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.clear();
                last.content.push_str(content);
                true
            }
            _ => false,
        }
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::user("Hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "Hello");

        let parsed: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"Hi"}"#).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let parsed = serde_json::from_str::<Message>(r#"{"role":"tool","content":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_placeholder_grows() {
        let mut conversation = Conversation::new();
        conversation.add_user("Hi");
        conversation.begin_assistant();
        assert_eq!(conversation.last().unwrap().content, "");

        assert!(conversation.update_last_assistant("Hel"));
        assert!(conversation.update_last_assistant("Hello there"));
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last().unwrap().content, "Hello there");
    }

    #[test]
    fn test_update_requires_assistant_tail() {
        let mut conversation = Conversation::new();
        conversation.add_user("Hi");
        assert!(!conversation.update_last_assistant("ignored"));
        assert_eq!(conversation.last().unwrap().content, "Hi");
    }
}
