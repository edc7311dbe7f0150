use serde::{Deserialize, Serialize};

use crate::types::Message;

/// A message matching a cross-session search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The matching message.
    pub message: Message,

    /// Name of the session holding the message.
    #[serde(default)]
    pub session_name: Option<String>,

    /// Id of the session holding the message.
    pub session_id: String,
}
