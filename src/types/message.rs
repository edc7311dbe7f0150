use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Reserved id of the transient message shown while a reply streams in.
pub const STREAMING_MESSAGE_ID: &str = "streaming-placeholder";

/// Who authored a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard.
    User,

    /// The model.
    Assistant,

    /// Client-side notices, such as send failures.
    System,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileReference {
    /// File name as shown to the user.
    pub name: String,

    /// Size in bytes.
    #[serde(default)]
    pub size: u64,

    /// MIME type.
    #[serde(default, rename = "type")]
    pub mime_type: String,
}

/// A chat message.
///
/// Once a message is in a session its `id` and `role` are fixed; only the
/// streaming placeholder has its `content` rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Opaque identifier.
    pub id: String,

    /// Author of the message.
    pub role: Role,

    /// Raw Markdown text.
    pub content: String,

    /// Creation time.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// The session this message belongs to, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// The agent that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Attached files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReference>,
}

impl Message {
    /// Create a message with a fresh id stamped now.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            session_id: None,
            agent: None,
            files: Vec::new(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a client-side system notice.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// The transient message that mirrors a reply while it streams.
    pub fn streaming_placeholder() -> Self {
        Self {
            id: STREAMING_MESSAGE_ID.to_string(),
            ..Self::assistant("")
        }
    }

    /// Tag an assistant message with the agent that wrote it.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        if self.role == Role::Assistant {
            self.agent = Some(agent.into());
        }
        self
    }

    /// Attach file references.
    pub fn with_files(mut self, files: Vec<FileReference>) -> Self {
        self.files = files;
        self
    }

    /// Returns true for the streaming placeholder.
    pub fn is_streaming_placeholder(&self) -> bool {
        self.id == STREAMING_MESSAGE_ID
    }
}

/// A locally unique id: base-36 millisecond timestamp plus random base-36 suffix.
pub fn generate_id() -> String {
    let millis = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u128;
    format!("{}{}", to_base36(millis), random_base36(9))
}

pub(crate) fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) fn random_base36(len: usize) -> String {
    use rand::Rng;
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| DIGITS[rng.gen_range(0..DIGITS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip_names() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn deserializes_backend_record() {
        let json = r#"{
            "id": "m1",
            "session_id": "s1",
            "content": "hello",
            "role": "assistant",
            "timestamp": "2025-01-02T03:04:05.123456",
            "files": []
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.session_id.as_deref(), Some("s1"));
        assert!(message.files.is_empty());
        assert!(message.agent.is_none());
    }

    #[test]
    fn agent_tag_only_on_assistant() {
        assert_eq!(
            Message::assistant("hi").with_agent("aria").agent.as_deref(),
            Some("aria")
        );
        assert!(Message::user("hi").with_agent("aria").agent.is_none());
    }

    #[test]
    fn ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn placeholder_has_reserved_id() {
        let placeholder = Message::streaming_placeholder();
        assert!(placeholder.is_streaming_placeholder());
        assert_eq!(placeholder.role, Role::Assistant);
        assert!(!Message::assistant("done").is_streaming_placeholder());
    }
}
