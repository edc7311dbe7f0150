//! The calls the chat controller makes against the API.

use crate::client::AriaClient;
use crate::error::Result;
use crate::pager::PageSource;
use crate::types::{
    HealthStatus, ImprovedPrompt, PasswordResponse, SearchResult, SessionDescriptor,
    ValidationResponse,
};
use crate::upload::Attachment;

/// Everything the controller needs from the server.
///
/// [`AriaClient`] is the real implementation.  Futures are not required to be
/// `Send`: the stream callback borrows the controller's view.
#[async_trait::async_trait(?Send)]
pub trait ChatBackend: PageSource {
    /// Every session, without messages.
    async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>>;

    /// Create a session.
    async fn create_session(&self, name: Option<&str>) -> Result<SessionDescriptor>;

    /// Delete a session.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Send a user message, streaming the reply into `on_chunk`.
    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        attachments: &[Attachment],
        on_chunk: &mut dyn for<'a, 'b> FnMut(&'a str, &'b str),
    ) -> Result<String>;

    /// Delete one message.
    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()>;

    /// Search message text across sessions.
    async fn search_messages(&self, query: &str) -> Result<Vec<SearchResult>>;

    /// Set or change a session's password.
    async fn set_password(&self, session_id: &str, current: &str, new: &str)
    -> Result<PasswordResponse>;

    /// Remove a session's password.
    async fn remove_password(&self, session_id: &str, current: Option<&str>)
    -> Result<PasswordResponse>;

    /// Check a password against a session.
    async fn validate_password(&self, session_id: &str, password: &str)
    -> Result<ValidationResponse>;

    /// Rewrite a draft prompt.
    async fn improve_prompt(&self, text: &str) -> Result<ImprovedPrompt>;

    /// Server health.
    async fn health(&self) -> Result<HealthStatus>;
}

#[async_trait::async_trait(?Send)]
impl ChatBackend for AriaClient {
    async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>> {
        self.session_metadata().await
    }

    async fn create_session(&self, name: Option<&str>) -> Result<SessionDescriptor> {
        AriaClient::create_session(self, name).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        AriaClient::delete_session(self, session_id).await
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        attachments: &[Attachment],
        on_chunk: &mut dyn for<'a, 'b> FnMut(&'a str, &'b str),
    ) -> Result<String> {
        AriaClient::send_message(self, session_id, content, attachments, Some(on_chunk)).await
    }

    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()> {
        AriaClient::delete_message(self, session_id, message_id).await
    }

    async fn search_messages(&self, query: &str) -> Result<Vec<SearchResult>> {
        AriaClient::search_messages(self, query).await
    }

    async fn set_password(
        &self,
        session_id: &str,
        current: &str,
        new: &str,
    ) -> Result<PasswordResponse> {
        self.set_session_password(session_id, current, new).await
    }

    async fn remove_password(
        &self,
        session_id: &str,
        current: Option<&str>,
    ) -> Result<PasswordResponse> {
        self.remove_session_password(session_id, current).await
    }

    async fn validate_password(
        &self,
        session_id: &str,
        password: &str,
    ) -> Result<ValidationResponse> {
        self.validate_session_password(session_id, password).await
    }

    async fn improve_prompt(&self, text: &str) -> Result<ImprovedPrompt> {
        AriaClient::improve_prompt(self, text).await
    }

    async fn health(&self) -> Result<HealthStatus> {
        AriaClient::health(self).await
    }
}
