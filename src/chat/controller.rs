//! The chat controller.
//!
//! A send goes through an optimistic local append, a streamed reply shown in
//! a placeholder, and a refresh that lets the backend's copy of the session
//! replace the local one.  The controller also owns the session list, the
//! pending attachments, and the sidebar state, and is the only thing that
//! talks to the view.

use std::path::Path;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::chat::backend::ChatBackend;
use crate::chat::config::ChatConfig;
use crate::diagram::DiagramRenderer;
use crate::error::{Error, Result};
use crate::events::{AppEvent, EventBus, drain};
use crate::fragment::Fragment;
use crate::markdown;
use crate::names::generate_session_name;
use crate::observability::{CHAT_SEND_ERRORS, CHAT_SENDS};
use crate::pager::{DEFAULT_PAGE_SIZE, HistoryPager, LoadOutcome, Viewport};
use crate::render::{Renderer, ToastKind};
use crate::sidebar::SidebarController;
use crate::store::{LocalCache, SessionStore};
use crate::types::{
    HealthStatus, ImprovedPrompt, Message, SearchResult, Session, ValidationResponse,
};
use crate::upload::{Attachment, UploadController, UploadPolicy};

/// Toast shown when the refresh after a reply fails.
pub const REFRESH_FAILED: &str = "Could not refresh session; showing local copy";

// Coarse failure category for log lines.
fn failure_class(err: &Error) -> &'static str {
    if err.is_not_found() {
        "not_found"
    } else if err.is_transport() {
        "transport"
    } else if err.is_decode() {
        "decode"
    } else if err.is_validation() {
        "validation"
    } else {
        "other"
    }
}

/// Where the controller is in the life of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    /// Nothing typed, nothing in flight.
    #[default]
    Idle,
    /// The input holds text.
    Composing,
    /// The request is out; no reply yet.
    Sending,
    /// Reply chunks are arriving.
    Streaming,
    /// The reply is complete and the session is being refreshed.
    Reconciling,
    /// The send failed.
    Error,
}

impl ChatState {
    /// Returns true while a send is in flight.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            ChatState::Sending | ChatState::Streaming | ChatState::Reconciling
        )
    }
}

/// What became of a call to [`ChatController::submit`].
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The message was sent and the reply received.
    Sent {
        /// The full reply text.
        reply: String,
    },
    /// The input was blank.
    Empty,
    /// Another send is in flight.
    Busy,
    /// The send failed; a notice was added to the session.
    Failed(Error),
}

/// Drives the chat: input, sends, sessions, attachments, and the sidebar.
pub struct ChatController<B: ChatBackend, R: Renderer> {
    backend: B,
    view: R,
    store: SessionStore,
    pager: HistoryPager,
    uploads: UploadController,
    sidebar: SidebarController,
    events: EventBus,
    subscription: broadcast::Receiver<AppEvent>,
    diagrams: DiagramRenderer,
    cache: Option<LocalCache>,
    state: ChatState,
    input: String,
    streaming: Option<Message>,
}

impl<B: ChatBackend, R: Renderer> ChatController<B, R> {
    /// A controller without an on-disk cache.
    pub fn new(backend: B, view: R, diagrams: DiagramRenderer) -> Self {
        Self::build(backend, view, diagrams, None, DEFAULT_PAGE_SIZE)
    }

    /// A controller using the cache directory and page size of `config`.
    pub fn from_config(backend: B, view: R, diagrams: DiagramRenderer, config: &ChatConfig) -> Self {
        let cache = config.cache_dir.clone().map(LocalCache::new);
        Self::build(backend, view, diagrams, cache, config.page_size)
    }

    fn build(
        backend: B,
        view: R,
        diagrams: DiagramRenderer,
        cache: Option<LocalCache>,
        page_size: u32,
    ) -> Self {
        let events = EventBus::new();
        let subscription = events.subscribe();
        Self {
            backend,
            view,
            store: SessionStore::new(),
            pager: HistoryPager::new(page_size),
            uploads: UploadController::new(UploadPolicy::default(), events.clone()),
            sidebar: SidebarController::new(cache.clone(), events.clone()),
            events,
            subscription,
            diagrams,
            cache,
            state: ChatState::Idle,
            input: String::new(),
            streaming: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> ChatState {
        self.state
    }

    /// The text waiting to be sent.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The sessions.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The view.
    pub fn view(&self) -> &R {
        &self.view
    }

    /// The view, for front-end specific output.
    pub fn view_mut(&mut self) -> &mut R {
        &mut self.view
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The bus controllers publish on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Pending attachments.
    pub fn uploads(&self) -> &UploadController {
        &self.uploads
    }

    /// The sidebar state.
    pub fn sidebar(&self) -> &SidebarController {
        &self.sidebar
    }

    /// The current session id.
    pub fn current_session_id(&self) -> Option<&str> {
        self.store.current_id()
    }

    /// The reply being streamed, if any.
    pub fn streaming_message(&self) -> Option<&Message> {
        self.streaming.as_ref()
    }

    /// Returns true if the typing indicator is showing.
    pub fn is_typing(&self) -> bool {
        matches!(self.state, ChatState::Sending | ChatState::Streaming)
    }

    /// Returns true iff the input holds non-blank text and nothing is in flight.
    pub fn can_send(&self) -> bool {
        !self.input.trim().is_empty() && !self.state.is_busy()
    }

    /// Replace the input text.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        if !self.state.is_busy() {
            self.state = if self.input.trim().is_empty() {
                ChatState::Idle
            } else {
                ChatState::Composing
            };
        }
        self.view.set_send_enabled(self.can_send());
    }

    fn is_current(&self, session_id: &str) -> bool {
        self.store.current_id() == Some(session_id)
    }

    /// Load the session list and show the first session.
    ///
    /// If the backend cannot be reached the cached list is used instead.
    /// With no sessions at all, one is created.
    pub async fn start(&mut self) -> Result<()> {
        match self.backend.list_sessions().await {
            Ok(descriptors) => {
                tracing::debug!(sessions = descriptors.len(), "loaded session list");
                self.store.sync_metadata(descriptors);
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not load sessions from the server");
                let cached = self.load_cache();
                if cached.is_empty() {
                    self.view
                        .toast(ToastKind::Error, &format!("Could not load sessions: {}", err.detail()));
                    return Err(err);
                }
                self.store = SessionStore::from_sessions(cached);
                self.view
                    .toast(ToastKind::Warning, "Server unreachable; showing cached sessions");
            }
        }
        match self.store.sessions().first().map(|s| s.id.clone()) {
            Some(id) => self.switch_session(&id).await,
            None => self.new_session(None).await.map(|_| ()),
        }
    }

    /// Make `session_id` current, load its newest messages if none are
    /// loaded yet, and redraw.
    pub async fn switch_session(&mut self, session_id: &str) -> Result<()> {
        self.store.set_current(session_id)?;
        self.events.emit(AppEvent::SessionChanged {
            session_id: Some(session_id.to_string()),
        });
        let needs_load = self
            .store
            .get(session_id)
            .is_some_and(|s| s.messages.is_empty() && s.has_more);
        if needs_load {
            if let Err(err) = self
                .pager
                .load_latest(&self.backend, &mut self.store, session_id)
                .await
            {
                tracing::warn!(session_id, error = %err, "could not load messages");
                self.view.toast(
                    ToastKind::Warning,
                    &format!("Could not load messages: {}", err.detail()),
                );
            }
        }
        self.redraw().await;
        Ok(())
    }

    /// Create a session, named by the caller or generated, and switch to it.
    pub async fn new_session(&mut self, name: Option<String>) -> Result<String> {
        let name = name.unwrap_or_else(|| generate_session_name(&self.store.names()));
        let descriptor = self.backend.create_session(Some(&name)).await?;
        let session = Session::from(descriptor);
        let id = session.id.clone();
        tracing::info!(session_id = %id, name = %session.name, "created session");
        self.store.insert(session);
        self.switch_session(&id).await?;
        self.save_cache();
        Ok(id)
    }

    /// Delete a session on the server and locally.
    ///
    /// If it was current the next session is shown; if it was the last one
    /// a new one is created.
    pub async fn delete_session(&mut self, session_id: &str) -> Result<()> {
        self.store.require(session_id)?;
        match self.backend.delete_session(session_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!(session_id, "session already gone on the server");
            }
            Err(err) => return Err(err),
        }
        let was_current = self.is_current(session_id);
        let removed = self.store.remove(session_id);
        tracing::info!(session_id, "deleted session");
        if let Some(session) = removed {
            self.view
                .toast(ToastKind::Success, &format!("Deleted {}", session.name));
        }
        self.events.emit(AppEvent::SessionChanged {
            session_id: self.store.current_id().map(str::to_string),
        });
        if was_current {
            match self.store.current_id().map(str::to_string) {
                Some(next) => self.switch_session(&next).await?,
                None => {
                    self.new_session(None).await?;
                }
            }
        }
        self.save_cache();
        Ok(())
    }

    /// Delete one message of the current session.
    pub async fn delete_message(&mut self, message_id: &str) -> Result<()> {
        let session_id = self.require_current()?;
        match self.backend.delete_message(&session_id, message_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!(session_id, message_id, "message already gone on the server");
            }
            Err(err) => return Err(err),
        }
        if !self.store.remove_message(&session_id, message_id)? {
            return Err(Error::not_found(
                format!("No message {message_id} in this session"),
                None,
                None,
            ));
        }
        self.redraw().await;
        self.save_cache();
        Ok(())
    }

    /// Resolve a 1-based position in the session list, an id, or a name.
    pub fn resolve_session(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if let Ok(position) = reference.parse::<usize>() {
            let entries = self.sidebar.entries(&self.store);
            if let Some(entry) = position.checked_sub(1).and_then(|i| entries.get(i)) {
                return Some(entry.id.clone());
            }
        }
        if let Some(session) = self.store.get(reference) {
            return Some(session.id.clone());
        }
        self.store
            .sessions()
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(reference))
            .map(|s| s.id.clone())
    }

    fn require_current(&self) -> Result<String> {
        self.store
            .current_id()
            .map(str::to_string)
            .ok_or_else(|| Error::validation("No session is selected", None))
    }

    async fn ensure_session(&mut self) -> Result<String> {
        match self.store.current_id() {
            Some(id) => Ok(id.to_string()),
            None => self.new_session(None).await,
        }
    }

    /// Send the input as a user message to the current session.
    ///
    /// Failures never escape as errors: they become a system message in the
    /// session and an error toast, and the controller returns to idle.
    pub async fn submit(&mut self) -> SubmitOutcome {
        if self.state.is_busy() {
            return SubmitOutcome::Busy;
        }
        let content = self.input.trim().to_string();
        if content.is_empty() {
            return SubmitOutcome::Empty;
        }
        let session_id = match self.ensure_session().await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, "no session to send to");
                self.view.toast(
                    ToastKind::Error,
                    &format!("Failed to send message: {}", err.detail()),
                );
                return SubmitOutcome::Failed(err);
            }
        };

        CHAT_SENDS.click();
        self.state = ChatState::Sending;
        self.input.clear();
        self.view.set_send_enabled(false);
        let attachments = self.uploads.take();
        let user = Message::user(content.clone())
            .with_files(attachments.iter().map(Attachment::reference).collect());
        tracing::info!(
            session_id,
            chars = content.len(),
            attachments = attachments.len(),
            "sending message"
        );
        self.append_local(&session_id, user).await;
        self.view.set_typing(true);

        let result = self.stream_reply(&session_id, &content, &attachments).await;
        self.view.set_typing(false);
        let outcome = match result {
            Ok(reply) => {
                self.reconcile(&session_id, &reply).await;
                SubmitOutcome::Sent { reply }
            }
            Err(err) => {
                self.fail_send(&session_id, &err).await;
                SubmitOutcome::Failed(err)
            }
        };
        self.state = ChatState::Idle;
        self.view.set_send_enabled(self.can_send());
        outcome
    }

    async fn stream_reply(
        &mut self,
        session_id: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> Result<String> {
        let mut placeholder = Message::streaming_placeholder();
        placeholder.session_id = Some(session_id.to_string());
        let streaming = self.streaming.insert(placeholder);
        let state = &mut self.state;
        let view = &mut self.view;
        let mut on_chunk = |_delta: &str, accumulated: &str| {
            *state = ChatState::Streaming;
            streaming.content.clear();
            streaming.content.push_str(accumulated);
            let html = markdown::render(accumulated);
            view.update_streaming(streaming, &html);
        };
        self.backend
            .send_message(session_id, content, attachments, &mut on_chunk)
            .await
    }

    // Appends a locally created message and shows it if its session is current.
    async fn append_local(&mut self, session_id: &str, message: Message) {
        let was_empty = self
            .store
            .get(session_id)
            .is_some_and(|s| s.messages.is_empty());
        let message_id = message.id.clone();
        if let Err(err) = self.store.push_message(session_id, message.clone()) {
            tracing::warn!(session_id, error = %err, "message for a session that is gone");
            return;
        }
        self.events.emit(AppEvent::MessageAdded {
            session_id: session_id.to_string(),
            message_id,
        });
        if !self.is_current(session_id) {
            return;
        }
        if was_empty {
            self.redraw().await;
        } else {
            let body = self.render_body(&message).await;
            self.view.render_message(&message, &body);
        }
    }

    async fn reconcile(&mut self, session_id: &str, reply: &str) {
        self.state = ChatState::Reconciling;
        self.streaming = None;
        let mut assistant = Message::assistant(reply);
        assistant.session_id = Some(session_id.to_string());
        let current = self.is_current(session_id);
        if current {
            let body = self.render_body(&assistant).await;
            self.view.finish_streaming(&assistant, &body);
        } else {
            tracing::debug!(session_id, "reply finished after a session switch; not shown");
        }
        let message_id = assistant.id.clone();
        match self.store.push_message(session_id, assistant) {
            Ok(()) => self.events.emit(AppEvent::MessageAdded {
                session_id: session_id.to_string(),
                message_id,
            }),
            Err(err) => {
                tracing::warn!(session_id, error = %err, "reply for a session that is gone");
                return;
            }
        }

        match self
            .pager
            .load_latest(&self.backend, &mut self.store, session_id)
            .await
        {
            Ok(()) => {
                if current {
                    if let Some(session) = self.store.get(session_id) {
                        self.view.session_reconciled(session);
                    }
                }
            }
            Err(err) => {
                self.state = ChatState::Error;
                tracing::warn!(
                    session_id,
                    error = %err,
                    class = failure_class(&err),
                    "refresh after send failed; keeping local messages"
                );
                if current {
                    self.view.toast(ToastKind::Warning, REFRESH_FAILED);
                }
            }
        }
        tracing::info!(session_id, chars = reply.len(), "reply received");
        self.save_cache();
    }

    async fn fail_send(&mut self, session_id: &str, err: &Error) {
        self.state = ChatState::Error;
        CHAT_SEND_ERRORS.click();
        tracing::error!(
            session_id,
            error = %err,
            class = failure_class(err),
            "failed to send message"
        );
        let had_placeholder = self.streaming.take().is_some();
        let current = self.is_current(session_id);
        if current && had_placeholder {
            self.view.clear_streaming();
        }
        let text = format!("Failed to send message: {}", err.detail());
        let mut notice = Message::system(text.clone());
        notice.session_id = Some(session_id.to_string());
        self.append_local(session_id, notice).await;
        if current {
            self.view.toast(ToastKind::Error, &text);
        }
    }

    async fn render_body(&self, message: &Message) -> Fragment {
        let body = Fragment::new(markdown::render(&message.content));
        if let Err(err) = self.diagrams.render_diagrams(&body).await {
            tracing::warn!(message_id = %message.id, error = %err, "diagrams were not rendered");
        }
        body
    }

    /// Draw the current session from scratch.
    pub async fn redraw(&mut self) {
        let Some(session) = self.store.current().cloned() else {
            self.view.render_welcome();
            return;
        };
        self.view.begin_session(&session);
        if session.messages.is_empty() {
            self.view.render_welcome();
        }
        for message in &session.messages {
            let body = self.render_body(message).await;
            self.view.render_message(message, &body);
        }
        self.view.set_send_enabled(self.can_send());
    }

    /// Load older messages if `viewport` is near the top.
    ///
    /// Returns `None` if no load was due.
    pub async fn on_scroll(&mut self, viewport: Viewport) -> Result<Option<LoadOutcome>> {
        let due = self
            .store
            .current()
            .is_some_and(|s| self.pager.should_load(s, &viewport));
        if !due {
            return Ok(None);
        }
        self.load_older(viewport).await.map(Some)
    }

    /// Load the page before the oldest loaded message of the current session.
    pub async fn load_older(&mut self, viewport: Viewport) -> Result<LoadOutcome> {
        let session_id = self.require_current()?;
        let result = self
            .pager
            .load_older(&self.backend, &mut self.store, &session_id, &mut self.view, viewport)
            .await;
        if let Err(err) = &result {
            self.view.toast(
                ToastKind::Error,
                &format!("Could not load older messages: {}", err.detail()),
            );
        }
        result
    }

    /// Filter the session list right away.
    pub fn search(&mut self, query: &str) {
        self.sidebar.set_query(query);
        self.show_sidebar();
    }

    /// Filter the session list once typing pauses; see [`Self::tick`].
    pub fn type_search(&mut self, query: &str, now: Instant) {
        self.sidebar.type_query(query, now);
    }

    /// Apply a settled search query.  Returns true if the list was redrawn.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.sidebar.poll(now) {
            self.show_sidebar();
            true
        } else {
            false
        }
    }

    /// Draw the session list.
    pub fn show_sidebar(&mut self) {
        let entries = self.sidebar.entries(&self.store);
        let empty_state = self.sidebar.empty_state(&self.store);
        self.view
            .render_sidebar(&entries, empty_state, self.sidebar.is_collapsed());
    }

    /// Collapse or expand the session list.
    pub fn toggle_sidebar(&mut self) -> bool {
        let collapsed = self.sidebar.toggle();
        self.show_sidebar();
        collapsed
    }

    /// Handle events published since the last call.  Returns true if the
    /// session list is out of date.
    pub fn pump_events(&mut self) -> bool {
        let mut stale = false;
        for event in drain(&mut self.subscription) {
            tracing::trace!(?event, "controller saw event");
            stale |= self.sidebar.needs_redraw(&event);
        }
        stale
    }

    /// Search message text on the server.
    pub async fn find(&mut self, query: &str) -> Result<Vec<SearchResult>> {
        let results = self.backend.search_messages(query).await?;
        tracing::debug!(query, results = results.len(), "message search");
        Ok(results)
    }

    /// Validate and attach a file from disk.
    pub fn attach(&mut self, path: &Path) -> Result<()> {
        match self.uploads.add_path(path) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "attachment rejected");
                self.view.toast(ToastKind::Error, &err.detail());
                Err(err)
            }
        }
    }

    /// Attach an in-memory file.
    pub fn attach_bytes(&mut self, attachment: Attachment) -> Result<()> {
        self.uploads.add(attachment)
    }

    /// Remove the attachment at a 1-based position.
    pub fn detach(&mut self, position: usize) -> Option<Attachment> {
        position
            .checked_sub(1)
            .and_then(|index| self.uploads.remove(index))
    }

    /// Ask the server for a clearer version of `text` and put it in the input.
    pub async fn improve_prompt(&mut self, text: &str) -> Result<ImprovedPrompt> {
        let improved = self.backend.improve_prompt(text).await?;
        if !improved.improved.trim().is_empty() {
            self.set_input(improved.improved.clone());
        }
        Ok(improved)
    }

    /// Set or change the current session's password.
    pub async fn set_password(&mut self, current: &str, new: &str) -> Result<()> {
        let session_id = self.require_current()?;
        let response = self.backend.set_password(&session_id, current, new).await?;
        if !response.success {
            return Err(Error::validation(response.message, Some(session_id)));
        }
        self.store.require_mut(&session_id)?.is_protected = true;
        self.view.toast(ToastKind::Success, &response.message);
        self.save_cache();
        Ok(())
    }

    /// Remove the current session's password.
    pub async fn remove_password(&mut self, current: Option<&str>) -> Result<()> {
        let session_id = self.require_current()?;
        let response = self.backend.remove_password(&session_id, current).await?;
        if !response.success {
            return Err(Error::validation(response.message, Some(session_id)));
        }
        self.store.require_mut(&session_id)?.is_protected = false;
        self.view.toast(ToastKind::Success, &response.message);
        self.save_cache();
        Ok(())
    }

    /// Check a password against the current session.
    pub async fn check_password(&mut self, password: &str) -> Result<ValidationResponse> {
        let session_id = self.require_current()?;
        self.backend.validate_password(&session_id, password).await
    }

    /// Server health.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.backend.health().await
    }

    /// Show an error from a command.
    pub fn report_error(&mut self, err: &Error) {
        tracing::warn!(error = %err, "command failed");
        self.view.print_error(&err.detail());
    }

    /// Write the session list to the cache.  Failures are logged only.
    pub fn save_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.save(self.store.sessions()) {
                tracing::warn!(path = %cache.path().display(), error = %err, "could not write session cache");
            }
        }
    }

    fn load_cache(&self) -> Vec<Session> {
        let Some(cache) = &self.cache else {
            return Vec::new();
        };
        match cache.load() {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(path = %cache.path().display(), error = %err, "could not read session cache");
                Vec::new()
            }
        }
    }
}
