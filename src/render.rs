//! Views for the chat client.
//!
//! The controllers describe what to show through the [`Renderer`] trait.
//! [`PlainTextRenderer`] draws to a terminal with optional ANSI styling;
//! [`CapturingRenderer`] records every call, for tests and for embedding the
//! controllers behind another front-end.

use std::io::{self, Stdout, Write};
use std::sync::LazyLock;

use regex::Regex;
use time::OffsetDateTime;

use crate::fragment::Fragment;
use crate::markdown::unescape_html;
use crate::pager::HistoryView;
use crate::sidebar::SidebarEntry;
use crate::types::{Message, Role, Session};
use crate::utils::format::{file_kind, format_file_size, format_time};

/// ANSI escape code for dim text (timestamps, system notices).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (author labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (user label, success).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (errors).
const ANSI_RED: &str = "\x1b[31m";

/// Greeting shown in place of an empty message list.
pub const WELCOME_MESSAGE: &str = "Hi there! I'm Aria. Ask me anything to get started.";

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    /// Neutral information.
    Info,
    /// Something finished.
    Success,
    /// Something degraded.
    Warning,
    /// Something failed.
    Error,
}

/// What a chat view must be able to show.
pub trait Renderer: HistoryView + Send {
    /// Start a full redraw of `session`; messages follow.
    fn begin_session(&mut self, session: &Session);

    /// Show the welcome placeholder instead of a message list.
    fn render_welcome(&mut self);

    /// Show one message with its rendered body.
    fn render_message(&mut self, message: &Message, body: &Fragment);

    /// Show or hide the "assistant is typing" indicator.
    fn set_typing(&mut self, typing: bool);

    /// Replace the streaming placeholder's content.
    ///
    /// `message` carries the full text so far; `html` is that text rendered.
    fn update_streaming(&mut self, message: &Message, html: &str);

    /// Remove the streaming placeholder.
    fn clear_streaming(&mut self);

    /// Replace the streaming placeholder with the finished message.
    fn finish_streaming(&mut self, message: &Message, body: &Fragment);

    /// The backend's copy of the shown session replaced the local one.
    fn session_reconciled(&mut self, session: &Session);

    /// Enable or disable the send control.
    fn set_send_enabled(&mut self, enabled: bool);

    /// Show a transient notification.
    fn toast(&mut self, kind: ToastKind, message: &str);

    /// Draw the session list.
    fn render_sidebar(&mut self, entries: &[SidebarEntry], empty_state: Option<&str>, collapsed: bool);

    /// Print an informational line.
    fn print_info(&mut self, info: &str);

    /// Print an error line.
    fn print_error(&mut self, error: &str);
}

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|h[1-6]|pre|blockquote|table|ul|ol|div)>|<hr\s*/?>").expect("block pattern is valid")
});
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:<br\s*/?>|</tr>|</li>|</text>)\n?").expect("line pattern is valid"));
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li[^>]*>").expect("item pattern is valid"));
static CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</t[dh]>").expect("cell pattern is valid"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank pattern is valid"));

/// Flatten an HTML fragment to readable text.
pub fn html_to_text(html: &str) -> String {
    let text = BLOCK_BREAK.replace_all(html, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = LIST_ITEM.replace_all(&text, "  - ");
    let text = CELL.replace_all(&text, " | ");
    let text = TAG.replace_all(&text, "");
    let text = unescape_html(&text);
    BLANK_RUN.replace_all(text.trim(), "\n\n").into_owned()
}

fn author(message: &Message) -> String {
    match message.role {
        Role::User => "You".to_string(),
        Role::Assistant => message.agent.clone().unwrap_or_else(|| "Aria".to_string()),
        Role::System => "System".to_string(),
    }
}

/// Terminal renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    streamed: usize,
    lines: usize,
    send_enabled: bool,
}

impl PlainTextRenderer<Stdout> {
    /// A renderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// A renderer on stdout with the given color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// A renderer on any writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            streamed: 0,
            lines: 0,
            send_enabled: true,
        }
    }

    /// The underlying writer.
    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Whether the send control is enabled.
    pub fn send_enabled(&self) -> bool {
        self.send_enabled
    }

    fn style(&self, code: &'static str) -> &'static str {
        if self.use_color { code } else { "" }
    }

    fn reset(&self) -> &'static str {
        self.style(ANSI_RESET)
    }

    // Terminal writes are best effort; a closed stdout is not worth failing a send over.
    fn write(&mut self, text: &str) {
        self.lines += text.matches('\n').count();
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn header(&mut self, message: &Message) {
        let color = match message.role {
            Role::User => self.style(ANSI_GREEN),
            Role::Assistant => self.style(ANSI_CYAN),
            Role::System => self.style(ANSI_YELLOW),
        };
        let line = format!(
            "{}{color}{}{} {}{}{}\n",
            self.style(ANSI_BOLD),
            author(message),
            self.reset(),
            self.style(ANSI_DIM),
            format_time(message.timestamp, OffsetDateTime::now_utc()),
            self.reset(),
        );
        self.write(&line);
    }
}

impl<W: Write + Send> HistoryView for PlainTextRenderer<W> {
    fn show_history_spinner(&mut self) {
        let line = format!("{}Loading older messages...{}\n", self.style(ANSI_DIM), self.reset());
        self.write(&line);
    }

    fn hide_history_spinner(&mut self) {}

    fn render_prepended(&mut self, session: &Session) -> f64 {
        let before = self.lines;
        self.begin_session(session);
        for message in &session.messages {
            let body = Fragment::new(crate::markdown::render(&message.content));
            self.render_message(message, &body);
        }
        (self.lines - before) as f64
    }

    fn set_scroll_top(&mut self, _scroll_top: f64) {}
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn begin_session(&mut self, session: &Session) {
        let line = format!(
            "\n{}== {} =={}\n",
            self.style(ANSI_BOLD),
            session.name,
            self.reset()
        );
        self.write(&line);
        if session.has_more {
            let hint = format!("{}(older messages: /older){}\n", self.style(ANSI_DIM), self.reset());
            self.write(&hint);
        }
    }

    fn render_welcome(&mut self) {
        let line = format!("{}{WELCOME_MESSAGE}{}\n", self.style(ANSI_CYAN), self.reset());
        self.write(&line);
    }

    fn render_message(&mut self, message: &Message, body: &Fragment) {
        self.header(message);
        let text = html_to_text(&body.html());
        if message.role == Role::System {
            let line = format!("{}{text}{}\n", self.style(ANSI_DIM), self.reset());
            self.write(&line);
        } else {
            self.write(&format!("{text}\n"));
        }
        for file in &message.files {
            let line = format!(
                "  {} {} ({})\n",
                file_kind(&file.name).icon(),
                file.name,
                format_file_size(file.size)
            );
            self.write(&line);
        }
        self.write("\n");
    }

    fn set_typing(&mut self, typing: bool) {
        if typing {
            let line = format!("{}Aria is typing...{}\n", self.style(ANSI_DIM), self.reset());
            self.write(&line);
        }
    }

    fn update_streaming(&mut self, message: &Message, _html: &str) {
        // A terminal cannot rewrite what it printed, so only the new suffix is written.
        let content = &message.content;
        if self.streamed == 0 && !content.is_empty() {
            self.header(message);
        }
        if let Some(suffix) = content.get(self.streamed..) {
            self.write(suffix);
        }
        self.streamed = content.len();
    }

    fn clear_streaming(&mut self) {
        if self.streamed > 0 {
            self.write("\n\n");
        }
        self.streamed = 0;
    }

    fn finish_streaming(&mut self, message: &Message, body: &Fragment) {
        if self.streamed == 0 {
            self.render_message(message, body);
        } else {
            self.clear_streaming();
        }
    }

    // What is on screen already matches; ids are not shown.
    fn session_reconciled(&mut self, _session: &Session) {}

    fn set_send_enabled(&mut self, enabled: bool) {
        self.send_enabled = enabled;
    }

    fn toast(&mut self, kind: ToastKind, message: &str) {
        let (color, label) = match kind {
            ToastKind::Info => (self.style(ANSI_CYAN), "info"),
            ToastKind::Success => (self.style(ANSI_GREEN), "ok"),
            ToastKind::Warning => (self.style(ANSI_YELLOW), "warning"),
            ToastKind::Error => (self.style(ANSI_RED), "error"),
        };
        let line = format!("{color}[{label}]{} {message}\n", self.reset());
        self.write(&line);
    }

    fn render_sidebar(&mut self, entries: &[SidebarEntry], empty_state: Option<&str>, collapsed: bool) {
        if collapsed {
            self.write("[sidebar collapsed: /sidebar to expand]\n");
            return;
        }
        if let Some(empty) = empty_state {
            let line = format!("{}{empty}{}\n", self.style(ANSI_DIM), self.reset());
            self.write(&line);
            return;
        }
        for (index, entry) in entries.iter().enumerate() {
            let marker = if entry.active { "*" } else { " " };
            let lock = if entry.protected { " [locked]" } else { "" };
            let line = format!(
                "{marker} {:>2}. {}{lock} {}({} msg){}\n",
                index + 1,
                entry.name,
                self.style(ANSI_DIM),
                entry.message_count,
                self.reset()
            );
            self.write(&line);
        }
    }

    fn print_info(&mut self, info: &str) {
        self.write(&format!("{info}\n"));
    }

    fn print_error(&mut self, error: &str) {
        let line = format!("{}Error: {error}{}\n", self.style(ANSI_RED), self.reset());
        self.write(&line);
    }
}

/// One call made on a [`CapturingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// `begin_session` with the session id.
    Session(String),
    /// `render_welcome`.
    Welcome,
    /// `render_message` with the message id, role, and rendered HTML.
    Message {
        /// Message id.
        id: String,
        /// Author.
        role: Role,
        /// Rendered body.
        html: String,
    },
    /// `set_typing`.
    Typing(bool),
    /// `update_streaming` with the full text so far.
    Streaming(String),
    /// `clear_streaming`.
    StreamingCleared,
    /// `session_reconciled` with the message ids now shown.
    Reconciled(Vec<String>),
    /// `set_send_enabled`.
    SendEnabled(bool),
    /// `toast`.
    Toast(ToastKind, String),
    /// `render_sidebar` with the names listed.
    Sidebar(Vec<String>),
    /// `show_history_spinner` / `hide_history_spinner`.
    Spinner(bool),
    /// `print_info`.
    Info(String),
    /// `print_error`.
    Error(String),
}

/// A renderer that records calls instead of drawing.
#[derive(Debug, Default)]
pub struct CapturingRenderer {
    /// Every call, in order.
    pub events: Vec<ViewEvent>,
    /// Height reported per message by `render_prepended`.
    pub message_height: f64,
}

impl CapturingRenderer {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Messages shown since the last `begin_session`, as `(id, role)`.
    pub fn visible_messages(&self) -> Vec<(String, Role)> {
        let start = self
            .events
            .iter()
            .rposition(|e| matches!(e, ViewEvent::Session(_)))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.events[start..]
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Message { id, role, .. } => Some((id.clone(), *role)),
                _ => None,
            })
            .collect()
    }

    /// Returns true if the welcome placeholder is showing.
    pub fn showing_welcome(&self) -> bool {
        let start = self
            .events
            .iter()
            .rposition(|e| matches!(e, ViewEvent::Session(_)))
            .unwrap_or(0);
        self.events[start..].iter().any(|e| *e == ViewEvent::Welcome)
    }

    /// The last send-control state reported.
    pub fn send_enabled(&self) -> Option<bool> {
        self.events.iter().rev().find_map(|e| match e {
            ViewEvent::SendEnabled(enabled) => Some(*enabled),
            _ => None,
        })
    }

    /// Every toast shown.
    pub fn toasts(&self) -> Vec<(ToastKind, String)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Toast(kind, text) => Some((*kind, text.clone())),
                _ => None,
            })
            .collect()
    }
}

impl HistoryView for CapturingRenderer {
    fn show_history_spinner(&mut self) {
        self.events.push(ViewEvent::Spinner(true));
    }

    fn hide_history_spinner(&mut self) {
        self.events.push(ViewEvent::Spinner(false));
    }

    fn render_prepended(&mut self, session: &Session) -> f64 {
        session.messages.len() as f64 * self.message_height
    }

    fn set_scroll_top(&mut self, _scroll_top: f64) {}
}

impl Renderer for CapturingRenderer {
    fn begin_session(&mut self, session: &Session) {
        self.events.push(ViewEvent::Session(session.id.clone()));
    }

    fn render_welcome(&mut self) {
        self.events.push(ViewEvent::Welcome);
    }

    fn render_message(&mut self, message: &Message, body: &Fragment) {
        self.events.push(ViewEvent::Message {
            id: message.id.clone(),
            role: message.role,
            html: body.html(),
        });
    }

    fn set_typing(&mut self, typing: bool) {
        self.events.push(ViewEvent::Typing(typing));
    }

    fn update_streaming(&mut self, message: &Message, _html: &str) {
        self.events.push(ViewEvent::Streaming(message.content.clone()));
    }

    fn clear_streaming(&mut self) {
        self.events.push(ViewEvent::StreamingCleared);
    }

    fn finish_streaming(&mut self, message: &Message, body: &Fragment) {
        self.events.push(ViewEvent::StreamingCleared);
        self.render_message(message, body);
    }

    fn session_reconciled(&mut self, session: &Session) {
        self.events.push(ViewEvent::Reconciled(
            session.messages.iter().map(|m| m.id.clone()).collect(),
        ));
    }

    fn set_send_enabled(&mut self, enabled: bool) {
        self.events.push(ViewEvent::SendEnabled(enabled));
    }

    fn toast(&mut self, kind: ToastKind, message: &str) {
        self.events.push(ViewEvent::Toast(kind, message.to_string()));
    }

    fn render_sidebar(&mut self, entries: &[SidebarEntry], _empty_state: Option<&str>, _collapsed: bool) {
        self.events
            .push(ViewEvent::Sidebar(entries.iter().map(|e| e.name.clone()).collect()));
    }

    fn print_info(&mut self, info: &str) {
        self.events.push(ViewEvent::Info(info.to_string()));
    }

    fn print_error(&mut self, error: &str) {
        self.events.push(ViewEvent::Error(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(renderer: &PlainTextRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.writer().clone()).unwrap()
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn html_flattens_to_text() {
        let html = crate::markdown::render("# Title\n\nSome **bold** & text\nnext line\n\n- one\n- two");
        assert_eq!(
            html_to_text(&html),
            "Title\n\nSome bold & text\nnext line\n\n  - one\n  - two"
        );
    }

    #[test]
    fn streaming_prints_only_new_text() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let mut placeholder = Message::streaming_placeholder();
        for accumulated in ["Hel", "Hello ", "Hello world"] {
            placeholder.content = accumulated.to_string();
            renderer.update_streaming(&placeholder, "");
        }
        renderer.finish_streaming(&Message::assistant("Hello world"), &Fragment::new("<p>Hello world</p>"));
        let out = output(&renderer);
        assert!(out.starts_with("Aria Just now\n"));
        assert!(out.ends_with("Hello world\n\n"));
        assert_eq!(out.matches("Hello").count(), 1);
    }

    #[test]
    fn system_messages_and_files_are_shown() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let message = Message::user("see attached").with_files(vec![crate::types::FileReference {
            name: "chart.png".to_string(),
            size: 1536,
            mime_type: "image/png".to_string(),
        }]);
        renderer.render_message(&message, &Fragment::new("<p>see attached</p>"));
        renderer.toast(ToastKind::Error, "Failed to send message");
        let out = output(&renderer);
        assert!(out.contains("You Just now\nsee attached\n"));
        assert!(out.contains("[img] chart.png (1.5 KB)"));
        assert!(out.contains("[error] Failed to send message"));
    }

    #[test]
    fn sidebar_lists_and_empty_states() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let entries = vec![SidebarEntry {
            id: "p".to_string(),
            name: "Giggling Penguin".to_string(),
            message_count: 3,
            active: true,
            protected: false,
        }];
        renderer.render_sidebar(&entries, None, false);
        renderer.render_sidebar(&[], Some(crate::sidebar::NO_MATCHES), false);
        let out = output(&renderer);
        assert!(out.contains("*  1. Giggling Penguin (3 msg)"));
        assert!(out.contains("No matching chats found."));
    }
}
