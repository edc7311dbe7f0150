use serde::{Deserialize, Serialize};

/// Body of `PUT /api/sessions/{id}/password`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SetPasswordRequest<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

/// Body of `DELETE /api/sessions/{id}/password`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RemovePasswordRequest<'a> {
    pub current_password: Option<&'a str>,
}

/// Body of `POST /api/sessions/{id}/validate`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ValidatePasswordRequest<'a> {
    pub password: &'a str,
}

/// Result of setting or removing a session password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PasswordResponse {
    /// Whether the change was applied.
    pub success: bool,

    /// Human-readable outcome.
    pub message: String,
}

/// Result of validating a session password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResponse {
    /// Whether the password matched.
    pub valid: bool,

    /// Why validation failed, if it did.
    #[serde(default)]
    pub error: Option<String>,
}
