use serde::{Deserialize, Serialize};

use crate::types::Message;

/// One page of a session's history, oldest message first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginatedMessages {
    /// The page, in chronological order.
    pub messages: Vec<Message>,

    /// Whether older messages exist before this page.
    #[serde(default)]
    pub has_more: bool,

    /// Cursor for the next (older) page; the position of the oldest message here.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl PaginatedMessages {
    /// An empty last page.
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            has_more: false,
            next_cursor: None,
        }
    }
}
