use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{Message, Role};

/// A session as described by `GET /api/sessions/metadata` and `POST /api/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDescriptor {
    /// Opaque identifier.
    pub id: String,

    /// Display name, if one was set.
    #[serde(default)]
    pub name: Option<String>,

    /// Creation time.
    #[serde(with = "crate::utils::time")]
    pub created: OffsetDateTime,

    /// Whether the session is password protected.
    #[serde(default)]
    pub is_protected: bool,

    /// Total messages stored for the session.
    #[serde(default)]
    pub message_count: u32,

    /// Messages authored by the user.
    #[serde(default)]
    pub user_message_count: u32,

    /// Time of the newest message.
    #[serde(default, with = "crate::utils::time::option")]
    pub last_message_timestamp: Option<OffsetDateTime>,

    /// Short preview of the newest message.
    #[serde(default)]
    pub last_message_preview: Option<String>,
}

/// A session held by the client, with whatever part of its history is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Opaque identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Creation time.
    #[serde(with = "crate::utils::time")]
    pub created: OffsetDateTime,

    /// Loaded messages, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Cursor for the next older page, if any.
    #[serde(default)]
    pub next_cursor: Option<String>,

    /// Whether the backend has older messages than the ones loaded.
    #[serde(default)]
    pub has_more: bool,

    /// Messages authored by the user.
    #[serde(default)]
    pub user_message_count: u32,

    /// Total messages stored by the backend.
    #[serde(default)]
    pub message_count: u32,

    /// Whether the session is password protected.
    #[serde(default)]
    pub is_protected: bool,

    /// Short preview of the newest message.
    #[serde(default)]
    pub last_message_preview: Option<String>,
}

impl Session {
    /// Create an empty local session.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created: OffsetDateTime::now_utc(),
            messages: Vec::new(),
            next_cursor: None,
            has_more: false,
            user_message_count: 0,
            message_count: 0,
            is_protected: false,
            last_message_preview: None,
        }
    }

    /// Append a message, keeping the counters in step.
    pub fn push_message(&mut self, message: Message) {
        if message.role == Role::User {
            self.user_message_count = self.user_message_count.saturating_add(1);
        }
        self.message_count = self.message_count.saturating_add(1);
        self.messages.push(message);
    }

    /// Number of user messages among the loaded ones.
    pub fn loaded_user_messages(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count()
    }

    /// Returns true when the session name or any loaded message contains the
    /// lowercase `query`.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(query)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(query))
    }
}

impl From<SessionDescriptor> for Session {
    fn from(descriptor: SessionDescriptor) -> Self {
        let name = descriptor.name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
            let short: String = descriptor.id.chars().take(8).collect();
            format!("Session {short}")
        });
        Self {
            id: descriptor.id,
            name,
            created: descriptor.created,
            messages: Vec::new(),
            next_cursor: None,
            has_more: descriptor.message_count > 0,
            user_message_count: descriptor.user_message_count,
            message_count: descriptor.message_count,
            is_protected: descriptor.is_protected,
            last_message_preview: descriptor.last_message_preview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_descriptor_gets_short_id_name() {
        let json = r#"{"id": "0123456789abcdef", "name": null, "created": "2025-01-01T00:00:00"}"#;
        let descriptor: SessionDescriptor = serde_json::from_str(json).unwrap();
        let session = Session::from(descriptor);
        assert_eq!(session.name, "Session 01234567");
        assert!(!session.has_more);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn descriptor_with_messages_has_more_to_load() {
        let json = r#"{
            "id": "s1",
            "name": "Sleepy Taco",
            "created": "2025-01-01T00:00:00Z",
            "message_count": 4,
            "user_message_count": 2,
            "is_protected": true
        }"#;
        let session = Session::from(serde_json::from_str::<SessionDescriptor>(json).unwrap());
        assert_eq!(session.name, "Sleepy Taco");
        assert!(session.has_more);
        assert!(session.is_protected);
        assert_eq!(session.user_message_count, 2);
    }

    #[test]
    fn push_counts_user_messages() {
        let mut session = Session::new("s", "Test");
        session.push_message(Message::user("a"));
        session.push_message(Message::assistant("b"));
        assert_eq!(session.user_message_count, 1);
        assert_eq!(session.message_count, 2);
        assert_eq!(session.loaded_user_messages(), 1);
    }

    #[test]
    fn matches_name_or_content() {
        let mut session = Session::new("s", "Giggling Penguin");
        session.push_message(Message::user("Tell me about Rust"));
        assert!(session.matches("pen"));
        assert!(session.matches("rust"));
        assert!(session.matches(""));
        assert!(!session.matches("taco"));
    }
}
