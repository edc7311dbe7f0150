use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::StreamExt;
use reqwest::header::{self, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::stream::collect_text;
use crate::types::password::{
    RemovePasswordRequest, SetPasswordRequest, ValidatePasswordRequest,
};
use crate::types::prompt::ImprovePromptRequest;
use crate::types::{
    FileReference, HealthStatus, ImprovedPrompt, PaginatedMessages, PasswordResponse,
    SearchResult, SessionDescriptor, ValidationResponse,
};
use crate::upload::Attachment;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(360);

/// How `send_message` encodes its request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestFormat {
    /// JSON without attachments, multipart with them.
    #[default]
    Auto,
    /// Always JSON; attachments travel as references only.
    Json,
    /// Always multipart.
    Multipart,
}

/// Client for the aria chat API.
#[derive(Clone)]
pub struct AriaClient {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    request_format: RequestFormat,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl fmt::Debug for AriaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AriaClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("request_format", &self.request_format)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    role: &'static str,
    files: Vec<FileReference>,
}

impl AriaClient {
    /// Create a new client.
    ///
    /// The base URL can be provided directly or read from the ARIA_API_URL
    /// environment variable; it defaults to `http://localhost:8000`.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var("ARIA_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        // Validate early so every endpoint can be joined onto it later.
        Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            request_format: RequestFormat::default(),
            logger: None,
        })
    }

    /// Choose how message bodies are encoded.
    pub fn with_request_format(mut self, format: RequestFormat) -> Self {
        self.request_format = format;
        self
    }

    /// Attach a logger that sees every request and streamed chunk.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL for `/api/<segments...>`, percent-encoding every segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::url(format!("cannot be a base URL: {}", self.base_url), None))?;
            path.pop_if_empty().push("api").extend(segments);
        }
        Ok(url)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out after {} seconds. Please try again.", self.timeout.as_secs()),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        #[derive(Deserialize)]
        struct ErrorBody {
            detail: Option<serde_json::Value>,
        }

        let status_text = status.canonical_reason().unwrap_or("Unknown status").to_string();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail)
            .map(|detail| match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .filter(|d| !d.is_empty())
            .unwrap_or(status_text);

        match status_code {
            404 => Error::not_found(detail, None, None),
            408 | 504 => Error::timeout(detail, None),
            _ => Error::api(status_code, detail),
        }
    }

    /// Send a request and return the successful response.
    async fn execute(&self, method: Method, url: Url, build: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Result<Response> {
        if let Some(logger) = &self.logger {
            logger.log_request(method.as_str(), url.path());
        }
        tracing::debug!(method = %method, path = url.path(), "api request");
        CLIENT_REQUESTS.click();
        let started = Instant::now();

        let request = build(self.client.request(method.clone(), url.clone()));
        let result = request.send().await;
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                CLIENT_REQUEST_ERRORS.click();
                let err = self.map_send_error(e);
                tracing::warn!(method = %method, path = url.path(), error = %err, "api request failed");
                return Err(err);
            }
        };

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::warn!(method = %method, path = url.path(), error = %err, "api returned an error");
            return Err(err);
        }
        Ok(response)
    }

    /// Decode a JSON response; `204 No Content` is `None`.
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        response.json::<T>().await.map(Some).map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.execute(Method::GET, url, |r| r).await?;
        Self::read_json(response).await?.ok_or_else(empty_body)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T> {
        let response = self.execute(method, url, |r| r.json(body)).await?;
        Self::read_json(response).await?.ok_or_else(empty_body)
    }

    async fn delete(&self, url: Url) -> Result<()> {
        let response = self.execute(Method::DELETE, url, |r| r).await?;
        // Some deployments answer deletes with a JSON acknowledgement; it carries nothing we need.
        Self::read_json::<serde_json::Value>(response).await.map(|_| ())
    }

    /// `GET /api/health`.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.get_json(self.endpoint(&["health"])?).await
    }

    /// `GET /api/sessions/metadata`: every session, without messages.
    pub async fn session_metadata(&self) -> Result<Vec<SessionDescriptor>> {
        self.get_json(self.endpoint(&["sessions", "metadata"])?).await
    }

    /// `POST /api/sessions`.
    pub async fn create_session(&self, name: Option<&str>) -> Result<SessionDescriptor> {
        let body = CreateSessionRequest { name };
        self.send_json(Method::POST, self.endpoint(&["sessions"])?, &body)
            .await
    }

    /// `DELETE /api/sessions/{id}`.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.delete(self.endpoint(&["sessions", session_id])?).await
    }

    /// `GET /api/sessions/{id}/messages/paginated`.
    ///
    /// With no cursor this returns the newest `limit` messages; with the
    /// `next_cursor` of a page it returns the page before it.
    pub async fn paginated_messages(
        &self,
        session_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<PaginatedMessages> {
        let mut url = self.endpoint(&["sessions", session_id, "messages", "paginated"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
                query.append_pair("cursor", cursor);
            }
        }
        self.get_json(url).await
    }

    /// `POST /api/sessions/{id}/messages`: send a user message and receive the reply.
    ///
    /// With `on_chunk`, the reply is read as a stream and `on_chunk(delta,
    /// accumulated)` runs once per decoded chunk, in order, before the next
    /// chunk is read.  Without it, the whole body is returned as text.
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        attachments: &[Attachment],
        mut on_chunk: Option<&mut dyn FnMut(&str, &str)>,
    ) -> Result<String> {
        let url = self.endpoint(&["sessions", session_id, "messages"])?;
        let multipart = match self.request_format {
            RequestFormat::Auto => !attachments.is_empty(),
            RequestFormat::Json => false,
            RequestFormat::Multipart => true,
        };
        let form = if multipart {
            Some(build_form(content, attachments)?)
        } else {
            None
        };

        let response = self
            .execute(Method::POST, url, |request| {
                let request = request.header(
                    header::ACCEPT,
                    HeaderValue::from_static("text/event-stream, text/plain, application/json"),
                );
                match form {
                    Some(form) => request.multipart(form),
                    None => request.json(&SendMessageRequest {
                        content,
                        role: "user",
                        files: attachments.iter().map(Attachment::reference).collect(),
                    }),
                }
            })
            .await?;

        let full = match on_chunk.as_mut() {
            Some(handler) => {
                let logger = self.logger.clone();
                let mut forward = |delta: &str, accumulated: &str| {
                    handler(delta, accumulated);
                    if let Some(logger) = &logger {
                        logger.log_stream_chunk(session_id, delta);
                    }
                };
                let bytes = response.bytes_stream().map(|result| {
                    result.map_err(|e| {
                        Error::streaming(format!("Error in HTTP stream: {}", e), Some(Box::new(e)))
                    })
                });
                collect_text(bytes, Some(&mut forward)).await?
            }
            None => response.text().await.map_err(|e| {
                Error::streaming(format!("Failed to read response: {}", e), Some(Box::new(e)))
            })?,
        };

        if let Some(logger) = &self.logger {
            logger.log_stream_complete(session_id, &full);
        }
        Ok(full)
    }

    /// `DELETE /api/sessions/{id}/messages/{message_id}`.
    pub async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()> {
        self.delete(self.endpoint(&["sessions", session_id, "messages", message_id])?)
            .await
    }

    /// `GET /api/sessions/search?q=`: search message text across sessions.
    pub async fn search_messages(&self, query: &str) -> Result<Vec<SearchResult>> {
        let mut url = self.endpoint(&["sessions", "search"])?;
        url.query_pairs_mut().append_pair("q", query);
        self.get_json(url).await
    }

    /// `PUT /api/sessions/{id}/password`: set or change the session password.
    pub async fn set_session_password(
        &self,
        session_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<PasswordResponse> {
        let body = SetPasswordRequest {
            current_password,
            new_password,
        };
        self.send_json(
            Method::PUT,
            self.endpoint(&["sessions", session_id, "password"])?,
            &body,
        )
        .await
    }

    /// `DELETE /api/sessions/{id}/password`.
    pub async fn remove_session_password(
        &self,
        session_id: &str,
        current_password: Option<&str>,
    ) -> Result<PasswordResponse> {
        let body = RemovePasswordRequest { current_password };
        self.send_json(
            Method::DELETE,
            self.endpoint(&["sessions", session_id, "password"])?,
            &body,
        )
        .await
    }

    /// `POST /api/sessions/{id}/validate`.
    pub async fn validate_session_password(
        &self,
        session_id: &str,
        password: &str,
    ) -> Result<ValidationResponse> {
        let body = ValidatePasswordRequest { password };
        self.send_json(
            Method::POST,
            self.endpoint(&["sessions", session_id, "validate"])?,
            &body,
        )
        .await
    }

    /// `POST /api/improve-prompt`: rewrite a draft prompt without changing its intent.
    pub async fn improve_prompt(&self, text: &str) -> Result<ImprovedPrompt> {
        let body = ImprovePromptRequest { text };
        self.send_json(Method::POST, self.endpoint(&["improve-prompt"])?, &body)
            .await
    }
}

fn empty_body() -> Error {
    Error::serialization("Expected a response body but the server sent none", None)
}

fn build_form(content: &str, attachments: &[Attachment]) -> Result<Form> {
    let mut form = Form::new()
        .text("content", content.to_string())
        .text("role", "user");
    for attachment in attachments {
        let part = Part::bytes(attachment.bytes.to_vec())
            .file_name(attachment.name.clone())
            .mime_str(&attachment.mime_type)
            .map_err(|e| {
                Error::validation(
                    format!("Invalid MIME type: {}", e),
                    Some(attachment.name.clone()),
                )
            })?;
        form = form.part("files", part);
    }
    Ok(form)
}
