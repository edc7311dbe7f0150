use serde::{Deserialize, Serialize};

/// Body of `POST /api/improve-prompt`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImprovePromptRequest<'a> {
    pub text: &'a str,
}

/// A rewritten draft prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImprovedPrompt {
    /// The draft as submitted.
    pub original: String,

    /// The rewritten prompt.
    pub improved: String,

    /// What changed and why.
    #[serde(default)]
    pub explanation: String,
}
